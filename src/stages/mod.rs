//! 专家阶段：Researcher → Logistics → Compliance → Experience → Decision
//!
//! 每个阶段读取 PlanningState、按需调用工具、原地更新状态并返回路由信号。
//! 阶段之间不共享任何可变状态；工具与 LLM 通过 StageContext 注入，可被多个运行并发使用。

pub mod compliance;
pub mod decision;
pub mod experience;
pub mod logistics;
pub mod researcher;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::core::{PlanningState, RoutingSignal, StageName};
use crate::llm::LlmClient;
use crate::tools::ToolExecutor;

pub use compliance::ComplianceStage;
pub use decision::DecisionStage;
pub use experience::ExperienceStage;
pub use logistics::LogisticsStage;
pub use researcher::ResearcherStage;

/// 标记入境受限的说明文字（Compliance 判定 BLOCKING，Logistics 纠正性重排时避开）
pub(crate) const RESTRICTED_MARKER: &str = "entry restricted";

/// 首字母大写，用于主题与通用活动名
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 阶段运行时可用的共享能力（跨运行共享，只读）
#[derive(Clone)]
pub struct StageContext {
    pub tools: Arc<ToolExecutor>,
    pub llm: Arc<dyn LlmClient>,
    pub config: Arc<AppConfig>,
}

/// 专家阶段
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// 运行一次；工具错误在阶段内部消化，只通过路由信号与合规标记体现
    async fn run(&self, state: &mut PlanningState, ctx: &StageContext) -> RoutingSignal;
}

/// 阶段表：Supervisor 按 StageName 取出阶段实现
#[derive(Clone)]
pub struct StageSet {
    stages: HashMap<StageName, Arc<dyn Stage>>,
}

impl StageSet {
    /// 五个标准阶段
    pub fn standard() -> Self {
        let mut set = Self {
            stages: HashMap::new(),
        };
        set.insert(Arc::new(ResearcherStage));
        set.insert(Arc::new(LogisticsStage));
        set.insert(Arc::new(ComplianceStage));
        set.insert(Arc::new(ExperienceStage));
        set.insert(Arc::new(DecisionStage));
        set
    }

    fn insert(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.name(), stage);
    }

    /// 替换某个阶段的实现（测试中注入异常阶段）
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.insert(stage);
        self
    }

    pub fn get(&self, name: StageName) -> Option<Arc<dyn Stage>> {
        self.stages.get(&name).cloned()
    }
}

impl Default for StageSet {
    fn default() -> Self {
        Self::standard()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("culture"), "Culture");
        assert_eq!(capitalize("éte"), "Éte");
        assert_eq!(capitalize(""), "");
    }
}
