//! 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 ToolError 决定 RetryAfter / Degrade / Abort。
//! 工具错误永远由调用阶段消化，不会让进程失败；运行级失败以 RunFailure 返回。

use std::time::Duration;

use thiserror::Error;

use crate::core::StageRecord;

/// 工具调用错误：均可由调用阶段恢复
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    #[error("Tool timeout: {tool} after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    #[error("Tool execution failed: {tool}: {message}")]
    Execution { tool: String, message: String },
}

impl ToolError {
    /// 超时与上游失败视为暂时性错误，可以重试；未注册的工具重试无意义
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Timeout { .. } | ToolError::Execution { .. })
    }

    pub fn tool(&self) -> &str {
        match self {
            ToolError::Unavailable(name) => name,
            ToolError::Timeout { tool, .. } | ToolError::Execution { tool, .. } => tool,
        }
    }
}

/// 请求校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Trip length must be between 1 and {max} days, got {days}")]
    InvalidDays { days: u32, max: u32 },

    #[error("Budget must be a finite, non-negative amount, got {0}")]
    InvalidBudget(f64),
}

/// 持久化协作方错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store task failed: {0}")]
    Join(String),
}

/// 运行失败：只携带原因、run_id 与阶段历史，不返回半成品行程
#[derive(Error, Debug, Clone)]
#[error("Run {run_id} failed: {reason}")]
pub struct RunFailure {
    pub run_id: String,
    pub reason: String,
    pub stage_history: Vec<StageRecord>,
}

/// 服务门面的顶层错误
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    RunFailed(#[from] RunFailure),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 等待给定时长后再次调用同一工具
    RetryAfter(Duration),
    /// 重试预算已耗尽，调用阶段应降级继续
    Degrade(String),
    /// 不可重试的错误（如工具未注册）
    Abort(String),
}
