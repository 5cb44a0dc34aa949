//! 回显工具：原样返回收到的参数，用于联调与观察参数增强的结果

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the received arguments unchanged"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "additionalProperties": true})
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        match args {
            Value::Object(_) => Ok(args),
            Value::Null => Ok(Value::Object(Default::default())),
            other => Err(format!("expected an argument object, got {other}")),
        }
    }
}
