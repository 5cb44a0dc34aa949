//! 会话门面
//!
//! Agent 组装调度器、缓存、轮次控制器与规划层，对外提供：
//! run（多轮工具调用会话）、create_plan / confirm_plan / cancel_plan / request_modification（计划生命周期）、stats。
//! 「当前计划」只有一个：新建计划整体替换旧计划；确认执行后无论成败都丢弃。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStats, ToolCache};
use crate::config::AppConfig;
use crate::core::{AgentError, ExecutionContext, ExecutionStats, StatsSnapshot};
use crate::llm::LlmClient;
use crate::planning::{
    modification_options, ExecutionPlan, PlanExecutor, PlanOutcome, PlanningEngine,
};
use crate::react::{
    BucketClassifier, ContinuationHeuristic, DefaultPlaybook, Playbook, RoundController,
    RunOutcome, SessionEvent,
};
use crate::scheduler::Scheduler;
use crate::tools::{ToolExecutor, ToolRegistry};

/// 执行统计 + 缓存统计
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentStats {
    pub execution: StatsSnapshot,
    pub cache: Option<CacheStats>,
}

/// request_modification 返回的描述性菜单；计划本身不变
#[derive(Debug, Clone, Serialize)]
pub struct ModificationMenu {
    pub plan_id: String,
    pub summary: String,
    pub options: Vec<String>,
}

/// 工具目录：一行一个工具的说明，后附参数 schema
fn tool_catalog(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return String::new();
    }
    let lines = registry
        .tool_descriptions()
        .into_iter()
        .map(|(name, desc)| format!("- {name}: {desc}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{lines}\n\nParameter schemas:\n{}", registry.to_schema_json())
}

/// 后台缓存清理任务；随 Agent 一起释放时取消
struct SweeperGuard {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

pub struct Agent {
    config: AppConfig,
    scheduler: Arc<Scheduler>,
    cache: Option<Arc<ToolCache>>,
    controller: RoundController,
    engine: PlanningEngine,
    plan_executor: PlanExecutor,
    current_plan: Option<ExecutionPlan>,
    sweeper: Option<SweeperGuard>,
}

impl Agent {
    /// 使用默认 playbook（工具目录取自 registry）
    pub fn new(config: AppConfig, registry: ToolRegistry, oracle: Arc<dyn LlmClient>) -> Self {
        let playbook = Arc::new(DefaultPlaybook::new(tool_catalog(&registry)));
        Self::with_playbook(config, registry, oracle, playbook)
    }

    pub fn with_playbook(
        config: AppConfig,
        registry: ToolRegistry,
        oracle: Arc<dyn LlmClient>,
        playbook: Arc<dyn Playbook>,
    ) -> Self {
        Self::build(config, registry, oracle, playbook, None)
    }

    /// 额外挂一个会话事件通道
    pub fn with_events(
        config: AppConfig,
        registry: ToolRegistry,
        oracle: Arc<dyn LlmClient>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let playbook = Arc::new(DefaultPlaybook::new(tool_catalog(&registry)));
        Self::build(config, registry, oracle, playbook, Some(event_tx))
    }

    fn build(
        config: AppConfig,
        registry: ToolRegistry,
        oracle: Arc<dyn LlmClient>,
        playbook: Arc<dyn Playbook>,
        event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
    ) -> Self {
        let executor = Arc::new(ToolExecutor::new(registry, config.tools.tool_timeout_ms));
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ToolCache::from_config(&config.cache)));

        let mut scheduler = Scheduler::new(executor, config.tools.max_concurrency)
            .with_stats(Arc::new(ExecutionStats::new()));
        if let Some(ref cache) = cache {
            scheduler = scheduler.with_cache(Arc::clone(cache));
        }
        let scheduler = Arc::new(scheduler);

        let heuristic = ContinuationHeuristic::new(
            config.agent.max_rounds,
            config.agent.min_investigation_rounds,
            BucketClassifier::from_config(&config.heuristic),
        );
        let mut controller =
            RoundController::new(oracle, playbook, Arc::clone(&scheduler), heuristic)
                .with_history_window(config.agent.history_window);
        if let Some(tx) = event_tx {
            controller = controller.with_event_tx(tx);
        }

        tracing::info!(
            max_rounds = config.agent.max_rounds,
            max_concurrency = config.tools.max_concurrency,
            cache = cache.is_some(),
            "agent ready"
        );

        Self {
            engine: PlanningEngine::new(Arc::clone(&scheduler), config.planning.clone()),
            plan_executor: PlanExecutor::new(Arc::clone(&scheduler)),
            config,
            scheduler,
            cache,
            controller,
            current_plan: None,
            sweeper: None,
        }
    }

    /// 启动后台缓存清理（需在 tokio runtime 内调用）；重复调用会替换旧任务
    pub fn spawn_cache_sweeper(&mut self) {
        if let Some(ref cache) = self.cache {
            let token = CancellationToken::new();
            let interval = Duration::from_millis(self.config.cache.sweep_interval_ms.max(1));
            let handle = cache.spawn_sweeper(interval, token.clone());
            self.sweeper = Some(SweeperGuard { token, handle });
        }
    }

    fn working_directory(&self) -> PathBuf {
        self.config
            .agent
            .working_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn base_context(&self, input: &str, ctx: Option<ExecutionContext>) -> ExecutionContext {
        match ctx {
            Some(mut ctx) => {
                if ctx.original_request.is_empty() {
                    ctx.original_request = input.to_string();
                }
                if ctx.working_directory.as_os_str().is_empty() {
                    ctx.working_directory = self.working_directory();
                }
                ctx
            }
            None => ExecutionContext::new(input, self.working_directory()),
        }
    }

    pub async fn run(&self, input: &str, ctx: Option<ExecutionContext>) -> RunOutcome {
        self.run_with_cancel(input, ctx, &CancellationToken::new()).await
    }

    /// 在轮次之间与等待预言机时检查取消令牌
    pub async fn run_with_cancel(
        &self,
        input: &str,
        ctx: Option<ExecutionContext>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let base = self.base_context(input, ctx);
        self.controller.run(input, &base, cancel).await
    }

    /// 生成计划并设为当前计划（整体替换之前的计划）
    pub async fn create_plan(
        &mut self,
        input: &str,
        ctx: Option<ExecutionContext>,
    ) -> Result<ExecutionPlan, AgentError> {
        let base = self.base_context(input, ctx);
        let plan = self.engine.create_plan(input, &base).await?;
        if let Some(old) = self.current_plan.replace(plan.clone()) {
            tracing::info!(old = %old.id, new = %plan.id, "replaced current plan");
        }
        Ok(plan)
    }

    pub fn current_plan(&self) -> Option<&ExecutionPlan> {
        self.current_plan.as_ref()
    }

    /// 执行当前计划；执行后计划被丢弃
    pub async fn confirm_plan(&mut self) -> Result<PlanOutcome, AgentError> {
        let plan = self.current_plan.take().ok_or(AgentError::NoActivePlan)?;
        let base = self.base_context(&plan.goal, None);
        Ok(self.plan_executor.execute_plan(&plan, &base).await)
    }

    /// 丢弃当前计划并返回它
    pub fn cancel_plan(&mut self) -> Result<ExecutionPlan, AgentError> {
        let plan = self.current_plan.take().ok_or(AgentError::NoActivePlan)?;
        tracing::info!(plan_id = %plan.id, "plan cancelled");
        Ok(plan)
    }

    /// 返回可选的编辑类别；真正修改需要重新 create_plan
    pub fn request_modification(&self) -> Result<ModificationMenu, AgentError> {
        let plan = self.current_plan.as_ref().ok_or(AgentError::NoActivePlan)?;
        Ok(ModificationMenu {
            plan_id: plan.id.clone(),
            summary: plan.format_summary(),
            options: modification_options().into_iter().map(String::from).collect(),
        })
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            execution: self.scheduler.stats().snapshot(),
            cache: self.cache.as_ref().map(|c| c.stats()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
