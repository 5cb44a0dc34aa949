//! 预言机输出解析
//!
//! ```json ... ``` 代码块按原样解析；否则在文本中逐个尝试 `{` / `[` 起点，取第一个解码成功且形如工具调用的 JSON 值。
//! 支持三种形状：单个调用对象、调用数组、{"tool_calls": [...]}。
//! 调用对象只能含 name/tool 与 parameters/args 键，且工具名是单个标识符；其余 JSON（如回复里引用的配置片段）视为正文。
//! 没有调用的纯文本视为最终回复（零个调用）；带显式工具键却无法解码的 JSON 返回 ParseError。

use serde_json::{Deserializer, Value};

use crate::core::{AgentError, ToolCall};

/// 调用对象允许出现的键
const CALL_KEYS: [&str; 4] = ["name", "tool", "parameters", "args"];

/// 解析预言机输出为工具调用列表
pub fn parse_tool_calls(output: &str) -> Result<Vec<ToolCall>, AgentError> {
    let trimmed = output.trim();
    let value = match fenced_json(trimmed) {
        Some(body) => serde_json::from_str(body)
            .map_err(|e| AgentError::ParseError(format!("{}: {}", e, preview(body))))?,
        None => match find_call_value(trimmed)? {
            Some(value) => value,
            None => return Ok(Vec::new()),
        },
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tool_calls") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(AgentError::ParseError(format!(
                    "tool_calls must be an array, got {}",
                    preview(&other.to_string())
                )))
            }
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(AgentError::ParseError(format!(
                "expected an object or array, got {}",
                preview(&other.to_string())
            )))
        }
    };

    let mut calls = Vec::with_capacity(items.len());
    for item in items {
        let call: ToolCall = serde_json::from_value(item)
            .map_err(|e| AgentError::ParseError(format!("invalid tool call: {e}")))?;
        if !call.name.trim().is_empty() {
            calls.push(call);
        }
    }
    Ok(calls)
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")?;
    let rest = &text[start + 7..];
    Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()))
}

/// 从每个 `{` / `[` 起点解码一个 JSON 值（忽略其后的文本），返回第一个形如调用的值
///
/// 没有找到时：若文本带显式工具键，返回该键所在对象的解码错误；否则视为纯文本。
fn find_call_value(text: &str) -> Result<Option<Value>, AgentError> {
    for (start, _) in text.match_indices(['{', '[']) {
        let mut stream = Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if is_call_shaped(&value) {
                return Ok(Some(value));
            }
        }
    }

    let Some(key_at) = ["\"tool_calls\"", "\"tool\""].iter().filter_map(|k| text.find(k)).min() else {
        return Ok(None);
    };
    let Some(start) = text[..key_at].rfind('{') else {
        return Ok(None);
    };
    let body = &text[start..];
    match Deserializer::from_str(body).into_iter::<Value>().next() {
        Some(Err(e)) => Err(AgentError::ParseError(format!("{}: {}", e, preview(body)))),
        _ => Ok(None),
    }
}

fn is_call_shaped(value: &Value) -> bool {
    match value {
        Value::Object(map) if map.contains_key("tool_calls") => true,
        Value::Object(map) => {
            let named = match map.get("name").or_else(|| map.get("tool")) {
                Some(Value::String(name)) => is_tool_name(name),
                _ => false,
            };
            named && map.keys().all(|k| CALL_KEYS.contains(&k.as_str()))
        }
        Value::Array(items) => !items.is_empty() && items.iter().all(is_call_shaped),
        _ => false,
    }
}

/// 工具名：单个标识符（可为空，空名调用随后被跳过）
fn is_tool_name(name: &str) -> bool {
    name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn preview(s: &str) -> String {
    s.chars().take(200).collect()
}
