//! 阶段名与路由信号
//!
//! 每个阶段运行结束返回一个 RoutingSignal，由 Supervisor 决定下一步。

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::RunStatus;

/// 五个专家阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Researcher,
    Logistics,
    Compliance,
    Experience,
    Decision,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Researcher => "researcher",
            StageName::Logistics => "logistics",
            StageName::Compliance => "compliance",
            StageName::Experience => "experience",
            StageName::Decision => "decision",
        }
    }

    /// 运行该阶段时 PlanningState 所处的状态；Decision 是对账的触发点
    pub fn status(&self) -> RunStatus {
        match self {
            StageName::Researcher => RunStatus::Researching,
            StageName::Logistics => RunStatus::PlanningLogistics,
            StageName::Compliance => RunStatus::CheckingCompliance,
            StageName::Experience => RunStatus::GeneratingExperience,
            StageName::Decision => RunStatus::Reconciling,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阶段给 Supervisor 的路由指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingSignal {
    /// 前进到指定阶段
    Continue(StageName),
    /// 重新运行指定阶段（计入该阶段的重试预算）
    Retry(StageName),
    /// 进入对账
    Done,
    /// 终止运行
    Abort(String),
}

impl RoutingSignal {
    pub fn abort(reason: impl Into<String>) -> Self {
        RoutingSignal::Abort(reason.into())
    }
}

impl fmt::Display for RoutingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingSignal::Continue(next) => write!(f, "CONTINUE({next})"),
            RoutingSignal::Retry(stage) => write!(f, "RETRY({stage})"),
            RoutingSignal::Done => f.write_str("DONE"),
            RoutingSignal::Abort(reason) => write!(f, "ABORT({reason})"),
        }
    }
}
