//! 工具结果缓存（TTL + 容量上限）
//!
//! 只缓存白名单中「昂贵、以读为主」的工具。键为 {tool, parameters, working_directory, round} 规范化 JSON 的 SHA-256。
//! 过期条目在 get 时惰性淘汰，并由后台 sweep 定期清理；容量溢出时淘汰最早插入的条目。
//! 写类工具（invalidating）成功执行后整个缓存清空，避免编辑之后读到旧内容。
//! 锁只在单次 get/set/sweep 内短暂持有，不跨 await。

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CacheSection;

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
    pub ttl: Duration,
    pub hit_count: u64,
}

impl CacheEntry {
    /// now - created_at < ttl 时仍有效
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// 插入顺序，队首最旧
    order: VecDeque<String>,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// 工具结果缓存
pub struct ToolCache {
    tools: HashSet<String>,
    invalidating: HashSet<String>,
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ToolCache {
    pub fn new(tools: impl IntoIterator<Item = impl Into<String>>, ttl: Duration, capacity: usize) -> Self {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
            invalidating: HashSet::new(),
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 这些工具成功执行后清空缓存
    pub fn with_invalidating(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.invalidating = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn from_config(section: &CacheSection) -> Self {
        Self::new(
            section.tools.iter().cloned(),
            Duration::from_millis(section.ttl_ms),
            section.capacity,
        )
        .with_invalidating(section.invalidate_on.iter().cloned())
    }

    /// 该工具是否在缓存白名单中
    pub fn is_cacheable(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }

    pub fn invalidates(&self, tool: &str) -> bool {
        self.invalidating.contains(tool)
    }

    /// 规范化缓存键：serde_json 的 Map 按键排序，同样的参数总是得到同样的哈希
    pub fn key(tool: &str, parameters: &Map<String, Value>, working_directory: &Path, round: usize) -> String {
        let canonical = serde_json::json!({
            "tool": tool,
            "parameters": parameters,
            "working_directory": working_directory.to_string_lossy(),
            "round": round,
        });
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 命中则返回值并累加 hit_count；过期则淘汰并视为未命中
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut inner = self.lock();
        let fresh = match inner.entries.get_mut(key) {
            Some(entry) if entry.is_fresh(now) => {
                entry.hit_count += 1;
                Some(entry.value.clone())
            }
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                inner.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 写入并使用配置的 TTL；超出容量时淘汰最早插入的条目
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut inner = self.lock();
        inner.remove(&key);
        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl: self.ttl,
                hit_count: 0,
            },
        );
        inner.order.push_back(key);
    }

    /// 某条目的命中次数（不计入统计，不淘汰）
    pub fn hit_count(&self, key: &str) -> Option<u64> {
        self.lock().entries.get(key).map(|e| e.hit_count)
    }

    /// 清理所有过期条目，返回清理数量
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_fresh(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        drop(inner);
        if !expired.is_empty() {
            self.evictions.fetch_add(expired.len() as u64, Ordering::Relaxed);
            tracing::debug!(removed = expired.len(), "cache sweep");
        }
        expired.len()
    }

    /// 后台定期清理，token 取消后退出
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.sweep();
                    }
                }
            }
        })
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        drop(inner);
        if dropped > 0 {
            self.evictions.fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(ttl_ms: u64, capacity: usize) -> ToolCache {
        ToolCache::new(["list-directory"], Duration::from_millis(ttl_ms), capacity)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_scenario() {
        let cache = cache(1000, 8);
        cache.set("k", json!({"files": 3}));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(cache.get("k"), Some(json!({"files": 3})));
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_exactly_at_ttl() {
        let cache = cache(1000, 8);
        cache.set("k", json!(1));
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest_insertion() {
        let cache = cache(10_000, 2);
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        assert_eq!(cache.get("a"), Some(json!(1)));
        cache.set("c", json!(3));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(json!(2)));
        assert_eq!(cache.get("c"), Some(json!(3)));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_moves_to_back() {
        let cache = cache(10_000, 2);
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        cache.set("a", json!(10));
        cache.set("c", json!(3));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(json!(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_count_and_stats() {
        let cache = cache(1000, 8);
        cache.set("k", json!(1));
        cache.get("k");
        cache.get("k");
        cache.get("missing");
        assert_eq!(cache.hit_count("k"), Some(2));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (2, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = cache(1000, 8);
        cache.set("old", json!(1));
        tokio::time::advance(Duration::from_millis(800)).await;
        cache.set("new", json!(2));
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get("new"), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let cache = Arc::new(cache(100, 8));
        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(50), token.clone());
        cache.set("k", json!(1));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(cache.len(), 0);
        token.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_key_is_deterministic_and_scoped() {
        let mut a = Map::new();
        a.insert("path".into(), json!("src"));
        a.insert("depth".into(), json!(2));
        let mut b = Map::new();
        b.insert("depth".into(), json!(2));
        b.insert("path".into(), json!("src"));
        let wd = Path::new("/repo");
        assert_eq!(ToolCache::key("ls", &a, wd, 1), ToolCache::key("ls", &b, wd, 1));
        assert_ne!(ToolCache::key("ls", &a, wd, 1), ToolCache::key("ls", &a, wd, 2));
        assert_ne!(ToolCache::key("ls", &a, wd, 1), ToolCache::key("ls", &a, Path::new("/other"), 1));
        assert_eq!(ToolCache::key("ls", &a, wd, 1).len(), 64);
    }

    #[test]
    fn test_allow_list() {
        let cache = cache(1000, 8);
        assert!(cache.is_cacheable("list-directory"));
        assert!(!cache.is_cacheable("write-file"));
    }

    #[test]
    fn test_invalidating_tools_from_config() {
        let cache = ToolCache::from_config(&CacheSection::default());
        assert!(cache.invalidates("edit-file"));
        assert!(cache.invalidates("write-file"));
        assert!(!cache.invalidates("read-file"));
    }

    #[test]
    fn test_clear_counts_evictions() {
        let cache = cache(1000, 8);
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 2);
    }
}
