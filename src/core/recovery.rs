//! 错误恢复引擎
//!
//! 根据 ToolError、已尝试次数与工具策略返回 RecoveryAction，供 ToolExecutor 决定是等待重试、降级还是放弃。

use crate::core::{RecoveryAction, ToolError};
use crate::tools::ToolPolicy;

/// 语义化错误恢复：将工具错误映射为可执行动作（等待重试 / 降级 / 放弃）
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// attempt 为已失败的次数减一（首次失败传 0）
    pub fn handle(&self, err: &ToolError, attempt: u32, policy: &ToolPolicy) -> RecoveryAction {
        if !err.is_transient() {
            return RecoveryAction::Abort(err.to_string());
        }
        if attempt < policy.max_retries {
            RecoveryAction::RetryAfter(policy.backoff.delay(attempt))
        } else {
            RecoveryAction::Degrade(format!(
                "{} (gave up after {} attempts)",
                err,
                attempt + 1
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Backoff;
    use std::time::Duration;

    fn policy() -> ToolPolicy {
        ToolPolicy::default()
            .with_max_retries(2)
            .with_backoff(Backoff::Fixed { delay_ms: 5 })
    }

    #[test]
    fn test_recovery_timeout_retries_within_budget() {
        let engine = RecoveryEngine::new();
        let err = ToolError::Timeout {
            tool: "retrieval_query".to_string(),
            timeout_ms: 10,
        };
        assert_eq!(
            engine.handle(&err, 0, &policy()),
            RecoveryAction::RetryAfter(Duration::from_millis(5))
        );
        assert_eq!(
            engine.handle(&err, 1, &policy()),
            RecoveryAction::RetryAfter(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_recovery_degrades_when_budget_exhausted() {
        let engine = RecoveryEngine::new();
        let err = ToolError::Execution {
            tool: "web_search".to_string(),
            message: "HTTP 503".to_string(),
        };
        match engine.handle(&err, 2, &policy()) {
            RecoveryAction::Degrade(msg) => assert!(msg.contains("HTTP 503")),
            other => panic!("Expected Degrade, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_unavailable_aborts() {
        let engine = RecoveryEngine::new();
        let err = ToolError::Unavailable("teleport".to_string());
        assert!(matches!(
            engine.handle(&err, 0, &policy()),
            RecoveryAction::Abort(_)
        ));
    }
}
