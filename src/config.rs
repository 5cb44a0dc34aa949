//! 编排配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，如 `FORAGER__AGENT__MAX_ROUNDS=8`）。
//! 所有字段都有默认值，缺省配置即可运行。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub cache: CacheSection,
    pub planning: PlanningSection,
    pub heuristic: HeuristicSection,
}

/// [agent] 段：轮数上限、最小调查深度、历史窗口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单个任务最多进行的轮数（硬上限，不受启发式影响）
    pub max_rounds: usize,
    /// 未达到该轮数前，只要有成功结果就继续
    pub min_investigation_rounds: usize,
    /// 用于构造消息的对话历史保留轮数
    pub history_window: usize,
    /// 默认工作目录，未设置时用 "."
    pub working_directory: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            min_investigation_rounds: default_min_investigation_rounds(),
            history_window: default_history_window(),
            working_directory: None,
        }
    }
}

fn default_max_rounds() -> usize {
    5
}

fn default_min_investigation_rounds() -> usize {
    2
}

fn default_history_window() -> usize {
    20
}

/// [tools] 段：单次调用超时、阶段内最大并发
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_ms: u64,
    pub max_concurrency: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 30_000,
            max_concurrency: 3,
        }
    }
}

/// [cache] 段：TTL、容量、后台清理间隔、可缓存的工具白名单、成功后清空缓存的写类工具
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub ttl_ms: u64,
    pub capacity: usize,
    pub sweep_interval_ms: u64,
    pub tools: Vec<String>,
    pub invalidate_on: Vec<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 300_000,
            capacity: 256,
            sweep_interval_ms: 60_000,
            tools: default_cached_tools(),
            invalidate_on: default_invalidating_tools(),
        }
    }
}

fn default_cached_tools() -> Vec<String> {
    vec![
        "list-directory".into(),
        "read-file".into(),
        "grep-search".into(),
        "issue-analysis".into(),
        "fetch-url".into(),
    ]
}

fn default_invalidating_tools() -> Vec<String> {
    vec![
        "edit-file".into(),
        "write-file".into(),
        "apply-patch".into(),
        "delete-file".into(),
        "move-file".into(),
    ]
}

/// [planning] 段：复杂度阈值（加权分 >= 阈值即升级）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningSection {
    pub medium_threshold: f64,
    pub complex_threshold: f64,
}

impl Default for PlanningSection {
    fn default() -> Self {
        Self {
            medium_threshold: 3.0,
            complex_threshold: 7.0,
        }
    }
}

/// [heuristic] 段：工具名到覆盖桶的子串匹配规则
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeuristicSection {
    pub requirement_patterns: Vec<String>,
    pub exploration_patterns: Vec<String>,
    pub structure_patterns: Vec<String>,
    pub content_patterns: Vec<String>,
    pub modification_patterns: Vec<String>,
}

impl Default for HeuristicSection {
    fn default() -> Self {
        let v = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            requirement_patterns: v(&["issue", "requirement", "ticket"]),
            exploration_patterns: v(&["grep", "search", "find", "symbol"]),
            structure_patterns: v(&["list", "tree", "structure", "outline"]),
            content_patterns: v(&["read", "fetch", "context", "diagnostic"]),
            modification_patterns: v(&["write", "edit", "patch", "create", "replace"]),
        }
    }
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGER")
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_rounds, 5);
        assert_eq!(cfg.agent.min_investigation_rounds, 2);
        assert_eq!(cfg.tools.max_concurrency, 3);
        assert!(cfg.cache.tools.contains(&"list-directory".to_string()));
        assert!(cfg.planning.medium_threshold < cfg.planning.complex_threshold);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = std::env::temp_dir().join(format!("forager_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("custom.toml");
        std::fs::write(&path, "[agent]\nmax_rounds = 9\n\n[cache]\nttl_ms = 1000\n").unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_rounds, 9);
        assert_eq!(cfg.agent.history_window, 20);
        assert_eq!(cfg.cache.ttl_ms, 1000);
        assert_eq!(cfg.cache.capacity, 256);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bad_value_is_config_error() {
        let dir = std::env::temp_dir().join(format!("forager_cfg_bad_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "[agent]\nmax_rounds = \"many\"\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
