//! 依赖感知调度器
//!
//! 一批调用 -> plan_stages 分阶段 -> 阶段之间严格串行、阶段内受 Semaphore 限制并发 -> 按输入顺序返回结果。
//! 参数增强时，上下文包含此前轮次与本批次已完成阶段的结果。
//! 分阶段出现内部错误时退回完全串行；单次调用的失败（未注册、超时、工具报错）被折叠成失败的 ToolResult，不会逃逸。
//! 白名单工具先查缓存，命中则不调用工具；写类工具成功后清空缓存。
//! dispatch_until_failure 在某阶段出现失败后不再派发后续阶段（计划执行用它保证「备份失败则不编辑」）。

pub mod dependency;
pub mod enhance;

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;

use crate::cache::ToolCache;
use crate::core::{duration_ms, AgentError, ExecutionContext, ExecutionStats, TaskScheduler, ToolCall, ToolResult};
use crate::tools::ToolExecutor;

pub use dependency::{plan_stages, DependencySpec, DependencyTable, StagePlan};
pub use enhance::{default_rules, enhance, EnhancementRule};

/// 调度器：持有执行器、可选缓存、依赖表、增强规则与工具池
pub struct Scheduler {
    executor: Arc<ToolExecutor>,
    cache: Option<Arc<ToolCache>>,
    table: DependencyTable,
    rules: Vec<EnhancementRule>,
    pool: TaskScheduler,
    stats: Arc<ExecutionStats>,
}

impl Scheduler {
    pub fn new(executor: Arc<ToolExecutor>, max_concurrency: usize) -> Self {
        Self {
            executor,
            cache: None,
            table: DependencyTable::default_table(),
            rules: default_rules(),
            pool: TaskScheduler::new(max_concurrency),
            stats: Arc::new(ExecutionStats::new()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ToolCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_dependencies(mut self, table: DependencyTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_rules(mut self, rules: Vec<EnhancementRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_stats(mut self, stats: Arc<ExecutionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn stats(&self) -> &Arc<ExecutionStats> {
        &self.stats
    }

    pub fn cache(&self) -> Option<&Arc<ToolCache>> {
        self.cache.as_ref()
    }

    /// 派发一批调用，结果顺序与输入一致，每个调用恰好一个结果
    pub async fn dispatch(&self, calls: &[ToolCall], ctx: &ExecutionContext) -> Vec<ToolResult> {
        let staged = plan_stages(calls, &self.table);
        self.dispatch_staged(calls, ctx, staged, false)
            .await
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| {
                    ToolResult::failed(call.clone(), "call was not dispatched", 0, ctx.round)
                })
            })
            .collect()
    }

    /// 同 dispatch，但某阶段有失败时停止；只返回实际派发了的调用的结果（按输入顺序）
    pub async fn dispatch_until_failure(
        &self,
        calls: &[ToolCall],
        ctx: &ExecutionContext,
    ) -> Vec<ToolResult> {
        let staged = plan_stages(calls, &self.table);
        self.dispatch_staged(calls, ctx, staged, true)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// 按给定分阶段结果执行；分阶段失败时退回完全串行
    async fn dispatch_staged(
        &self,
        calls: &[ToolCall],
        ctx: &ExecutionContext,
        staged: Result<StagePlan, AgentError>,
        halt_on_failure: bool,
    ) -> Vec<Option<ToolResult>> {
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        if calls.is_empty() {
            return slots;
        }

        let plan = match staged {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "staging failed, falling back to sequential execution");
                self.stats.record_sequential_fallback();
                StagePlan::sequential(calls.len())
            }
        };

        // 后续阶段的参数增强可以看到前面阶段的结果
        let mut stage_ctx = ctx.clone();
        for (index, stage) in plan.stages.iter().enumerate() {
            self.stats.record_stage(plan.is_forced_stage(index));
            tracing::debug!(round = ctx.round, stage = index, size = stage.len(), "dispatching stage");
            let stage_ctx_ref = &stage_ctx;
            let runs = stage.iter().map(|&i| {
                let call = &calls[i];
                async move { (i, self.run_call(call, stage_ctx_ref).await) }
            });
            let finished = join_all(runs).await;
            let stage_failed = finished.iter().any(|(_, r)| !r.success);
            for (i, result) in finished {
                stage_ctx.prior_results.push(result.clone());
                slots[i] = Some(result);
            }
            if halt_on_failure && stage_failed && index + 1 < plan.stages.len() {
                tracing::warn!(round = ctx.round, stage = index, "stage failed, later stages not dispatched");
                break;
            }
        }
        slots
    }

    /// 执行单个调用：增强参数 -> 查缓存 -> 取许可 -> 执行 -> 写缓存
    async fn run_call(&self, call: &ToolCall, ctx: &ExecutionContext) -> ToolResult {
        let call = enhance(call, &self.rules, ctx);

        let cache_key = self
            .cache
            .as_ref()
            .filter(|c| c.is_cacheable(&call.name))
            .map(|c| (c, ToolCache::key(&call.name, &call.parameters, &ctx.working_directory, ctx.round)));

        if let Some((cache, key)) = &cache_key {
            let cached = cache.get(key);
            self.stats.record_cache(cached.is_some());
            if let Some(value) = cached {
                tracing::debug!(tool = %call.name, "cache hit");
                self.stats.record_call(true);
                return ToolResult::from_cache(call, value, ctx.round);
            }
        }

        let _permit = self.pool.acquire_tool().await;
        let start = Instant::now();
        let outcome = self.executor.execute(&call.name, call.args()).await;
        let elapsed_ms = duration_ms(start.elapsed());

        match outcome {
            Ok(value) => {
                self.stats.record_call(true);
                if let Some(cache) = self.cache.as_ref().filter(|c| c.invalidates(&call.name)) {
                    tracing::debug!(tool = %call.name, "write tool succeeded, clearing cache");
                    cache.clear();
                }
                if let Some((cache, key)) = cache_key {
                    cache.set(key, value.clone());
                }
                ToolResult::ok(call, value, elapsed_ms, ctx.round)
            }
            Err(e) => {
                self.stats.record_call(false);
                if matches!(e, AgentError::ToolTimeout { .. }) {
                    self.stats.record_timeout();
                }
                ToolResult::failed(call, e.to_string(), elapsed_ms, ctx.round)
            }
        }
    }
}
