//! 工具池：并发许可与执行统计
//!
//! 阶段内的工具调用先从 Semaphore 取许可再执行（默认 3 个并发）；ExecutionStats 为简单累加计数，
//! 并发度有限，使用 Relaxed 原子即可。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 工具池：限制同一阶段内同时执行的工具数
pub struct TaskScheduler {
    tool_semaphore: Arc<Semaphore>,
    max_concurrent_tools: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        let max = max_concurrent_tools.max(1);
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max)),
            max_concurrent_tools: max,
        }
    }

    /// 获取工具执行许可；Semaphore 不会被关闭，None 仅在理论上出现
    pub async fn acquire_tool(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.tool_semaphore).acquire_owned().await.ok()
    }

    pub fn max_concurrent_tools(&self) -> usize {
        self.max_concurrent_tools
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}

/// 执行统计计数器
#[derive(Debug, Default)]
pub struct ExecutionStats {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    stages: AtomicU64,
    forced_stages: AtomicU64,
    sequential_fallbacks: AtomicU64,
}

/// 某一时刻的统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub stages: u64,
    pub forced_stages: u64,
    pub sequential_fallbacks: u64,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self, success: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stage(&self, forced: bool) {
        self.stages.fetch_add(1, Ordering::Relaxed);
        if forced {
            self.forced_stages.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_sequential_fallback(&self) {
        self.sequential_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            stages: self.stages.load(Ordering::Relaxed),
            forced_stages: self.forced_stages.load(Ordering::Relaxed),
            sequential_fallbacks: self.sequential_fallbacks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let pool = TaskScheduler::new(2);
        let a = pool.acquire_tool().await;
        let b = pool.acquire_tool().await;
        assert!(a.is_some() && b.is_some());
        assert_eq!(pool.tool_semaphore.available_permits(), 0);
        drop(a);
        assert_eq!(pool.tool_semaphore.available_permits(), 1);
    }

    #[test]
    fn test_zero_concurrency_clamped_to_one() {
        assert_eq!(TaskScheduler::new(0).max_concurrent_tools(), 1);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = ExecutionStats::new();
        stats.record_call(true);
        stats.record_call(false);
        stats.record_cache(true);
        stats.record_stage(true);
        let snap = stats.snapshot();
        assert_eq!(snap.calls, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.forced_stages, 1);
    }
}
