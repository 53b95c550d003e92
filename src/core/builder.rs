//! 规划器构建器：统一的初始化逻辑
//!
//! CLI、测试与上层服务都从这里得到同一套工具注册表、LLM 客户端与存储，
//! 任何一处都可以替换（检索协作方、LLM、存储、单个阶段或工具）。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{PlannerError, Supervisor};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::planner::TravelPlanner;
use crate::retrieval::{NoopRetriever, Retriever};
use crate::stages::{Stage, StageContext, StageSet};
use crate::store::{InMemoryRunStore, RunStore, SqliteRunStore};
use crate::tools::{
    CurrencyTool, MapsTool, RetrievalTool, RouteProfile, SearchTool, Tool, ToolExecutor, ToolRegistry,
    SEARCH_TOOL,
};

/// 按配置选择 LLM：provider = openai 且设置了 OPENAI_API_KEY 时走 OpenAI 兼容端点，否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if provider == "openai" => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::from_config(&cfg.llm, &key))
        }
        _ => {
            if provider != "mock" {
                tracing::warn!("provider {} requested but OPENAI_API_KEY is not set, using Mock LLM", provider);
            }
            Arc::new(MockLlmClient)
        }
    }
}

/// 按配置选择运行记录存储
pub fn create_store_from_config(cfg: &AppConfig) -> Result<Arc<dyn RunStore>, PlannerError> {
    let store: Arc<dyn RunStore> = match cfg.persistence.backend.to_lowercase().as_str() {
        "sqlite" => Arc::new(SqliteRunStore::open(&cfg.persistence.sqlite_path)?),
        "memory" => Arc::new(InMemoryRunStore::new()),
        other => return Err(PlannerError::ConfigError(format!("unknown persistence backend: {}", other))),
    };
    Ok(store)
}

/// TravelPlanner 构建器
pub struct PlannerBuilder {
    config: AppConfig,
    retriever: Option<Arc<dyn Retriever>>,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn RunStore>>,
    stages: StageSet,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl PlannerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            retriever: None,
            llm: None,
            store: None,
            stages: StageSet::standard(),
            extra_tools: Vec::new(),
        }
    }

    /// 检索协作方；未设置时使用空实现
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 替换某个阶段的实现
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages = self.stages.with_stage(stage);
        self
    }

    /// 追加（或按名替换）工具
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    /// 构建统一的工具注册表
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let cfg = &self.config;
        let retriever: Arc<dyn Retriever> = match &self.retriever {
            Some(r) => r.clone(),
            None => Arc::new(NoopRetriever),
        };

        let mut tools = ToolRegistry::new();
        tools.register(RetrievalTool::new(retriever, cfg.research.top_k));
        tools.register(CurrencyTool::new(cfg.tools.currency.rates.clone()));
        tools.register(MapsTool::new(RouteProfile::from(&cfg.logistics)));

        let search = &cfg.tools.search;
        match (&search.endpoint, search.enabled) {
            (Some(endpoint), true) => {
                let api_key = std::env::var(&search.api_key_env).ok();
                let timeout_secs = cfg.tools.tool_timeout_ms.div_ceil(1000);
                tools.register(SearchTool::new(endpoint.clone(), api_key, timeout_secs, search.max_results));
            }
            (None, true) => tracing::warn!("{} enabled but no endpoint configured", SEARCH_TOOL),
            _ => {}
        }

        for tool in &self.extra_tools {
            tools.register_arc(tool.clone());
        }
        tools
    }

    /// 工具执行器：全局默认策略 + [tools.per_tool] 覆盖
    pub fn build_executor(&self) -> ToolExecutor {
        let registry = self.build_tool_registry();
        let base = self.config.tools.default_policy();
        let names = registry.tool_names();
        let mut executor = ToolExecutor::new(registry, base.clone());
        for name in names {
            if self.config.tools.per_tool.contains_key(&name) {
                let policy = self.config.tools.override_for(&name, base.clone());
                executor = executor.with_policy(name, policy);
            }
        }
        executor
    }

    pub fn build(self) -> Result<TravelPlanner, PlannerError> {
        let executor = self.build_executor();
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let store = match self.store.clone() {
            Some(s) => s,
            None => create_store_from_config(&self.config)?,
        };
        tracing::info!(tools = ?executor.tool_names(), "planner ready");

        let ctx = StageContext {
            tools: Arc::new(executor),
            llm,
            config: Arc::new(self.config),
        };
        Ok(TravelPlanner::new(Supervisor::new(self.stages, ctx), store))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 便捷函数：加载配置（失败时退回默认值）并创建构建器
pub fn create_planner_builder(config_path: Option<PathBuf>) -> PlannerBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    PlannerBuilder::new(config)
}
