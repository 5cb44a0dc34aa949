//! 意图识别：从请求文本中找出 issue 编号、文件、URL、结构类词语与代码符号
//!
//! 结果用于两件事：第 0 轮的信息收集调用，以及计划阶段的主工具选择。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::core::ToolCall;

/// 每类最多生成的收集调用数
const MAX_CALLS_PER_KIND: usize = 3;

fn issue_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:#|\bissue\s+)(\d+)\b").ok())
        .as_ref()
}

fn file_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b((?:[\w-]+/)*[\w-]+\.(?:rs|toml|py|js|jsx|ts|tsx|go|java|kt|c|cc|cpp|h|hpp|md|json|ya?ml|sh))\b",
        )
        .ok()
    })
    .as_ref()
}

fn url_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s)>"']+"#).ok())
        .as_ref()
}

fn structure_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:structure|layout|director(?:y|ies)|folders?|tree|overview|architecture)\b").ok()
    })
    .as_ref()
}

fn symbol_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([A-Za-z_][\w:]*)`").ok())
        .as_ref()
}

/// 去重并保持首次出现的顺序
fn captures(re: Option<&Regex>, text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in re.into_iter().flat_map(|re| re.captures_iter(text)) {
        let m = cap.get(1).or_else(|| cap.get(0)).map(|m| m.as_str().to_string());
        if let Some(m) = m {
            if !out.contains(&m) {
                out.push(m);
            }
        }
    }
    out
}

/// 识别出的意图
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectedIntent {
    pub issue_numbers: Vec<u64>,
    pub file_references: Vec<String>,
    pub urls: Vec<String>,
    pub wants_structure: bool,
    pub symbols: Vec<String>,
}

impl DetectedIntent {
    pub fn detect(request: &str) -> Self {
        // URL 里的 "#frag"、".html" 不应被当成 issue 或文件
        let without_urls = url_re()
            .map(|re| re.replace_all(request, " ").into_owned())
            .unwrap_or_else(|| request.to_string());
        Self {
            issue_numbers: captures(issue_re(), &without_urls)
                .iter()
                .filter_map(|n| n.parse().ok())
                .collect(),
            file_references: captures(file_re(), &without_urls),
            urls: captures(url_re(), request),
            wants_structure: structure_re().is_some_and(|re| re.is_match(request)),
            symbols: captures(symbol_re(), &without_urls),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issue_numbers.is_empty()
            && self.file_references.is_empty()
            && self.urls.is_empty()
            && !self.wants_structure
            && self.symbols.is_empty()
    }

    /// 第 0 轮信息收集调用；只生成已注册工具的调用
    pub fn gathering_calls(&self, is_registered: impl Fn(&str) -> bool) -> Vec<ToolCall> {
        let mut calls = Vec::new();
        if is_registered("issue-analysis") {
            calls.extend(
                self.issue_numbers
                    .iter()
                    .take(MAX_CALLS_PER_KIND)
                    .map(|n| ToolCall::new("issue-analysis").with_param("issue_number", *n)),
            );
        }
        if is_registered("read-file") {
            calls.extend(
                self.file_references
                    .iter()
                    .take(MAX_CALLS_PER_KIND)
                    .map(|f| ToolCall::new("read-file").with_param("path", f.as_str())),
            );
        }
        if is_registered("fetch-url") {
            calls.extend(
                self.urls
                    .iter()
                    .take(MAX_CALLS_PER_KIND)
                    .map(|u| ToolCall::new("fetch-url").with_param("url", u.as_str())),
            );
        }
        if self.wants_structure && is_registered("list-directory") {
            calls.push(ToolCall::new("list-directory").with_param("path", "."));
        }
        if is_registered("grep-search") {
            calls.extend(
                self.symbols
                    .iter()
                    .take(MAX_CALLS_PER_KIND)
                    .map(|s| ToolCall::new("grep-search").with_param("pattern", s.as_str())),
            );
        }
        calls
    }

    /// 按固定优先级排列的主工具候选
    pub fn primary_candidates(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.issue_numbers.is_empty() {
            out.push("issue-analysis");
        }
        if !self.file_references.is_empty() {
            out.push("read-file");
        }
        if !self.symbols.is_empty() {
            out.push("grep-search");
        }
        if !self.urls.is_empty() {
            out.push("fetch-url");
        }
        if self.wants_structure {
            out.push("list-directory");
        }
        out
    }
}
