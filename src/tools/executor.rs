//! 工具执行器
//!
//! 持有 ToolRegistry 与默认策略：invoke 在超时内调用工具一次，超时或失败时转为 ToolError；
//! invoke_with_retry 按工具策略交给 RecoveryEngine 决定是否退避重试。每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{RecoveryAction, RecoveryEngine, ToolError};
use crate::tools::{ToolPolicy, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolError
pub struct ToolExecutor {
    registry: ToolRegistry,
    default_policy: ToolPolicy,
    overrides: HashMap<String, ToolPolicy>,
    recovery: RecoveryEngine,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, default_policy: ToolPolicy) -> Self {
        Self {
            registry,
            default_policy,
            overrides: HashMap::new(),
            recovery: RecoveryEngine::new(),
        }
    }

    /// 为指定工具设置策略（优先于工具自带策略）
    pub fn with_policy(mut self, tool: impl Into<String>, policy: ToolPolicy) -> Self {
        self.overrides.insert(tool.into(), policy);
        self
    }

    /// 生效策略：显式覆盖 > 工具自带 > 全局默认
    pub fn policy_for(&self, tool_name: &str) -> ToolPolicy {
        if let Some(p) = self.overrides.get(tool_name) {
            return p.clone();
        }
        self.registry
            .get(tool_name)
            .and_then(|t| t.policy())
            .unwrap_or_else(|| self.default_policy.clone())
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 调用一次；timeout_override 为 None 时使用策略超时
    pub async fn invoke(
        &self,
        tool_name: &str,
        args: Value,
        timeout_override: Option<Duration>,
    ) -> Result<Value, ToolError> {
        let budget = timeout_override.unwrap_or_else(|| self.policy_for(tool_name).timeout);
        self.invoke_once(tool_name, args, budget, 0).await
    }

    /// 按策略调用：暂时性错误退避后重试，重试耗尽或不可重试时返回最后一次错误
    pub async fn invoke_with_retry(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let policy = self.policy_for(tool_name);
        let mut attempt = 0u32;
        loop {
            let err = match self
                .invoke_once(tool_name, args.clone(), policy.timeout, attempt)
                .await
            {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            match self.recovery.handle(&err, attempt, &policy) {
                RecoveryAction::RetryAfter(delay) => {
                    tracing::warn!(
                        tool = tool_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "tool call failed: {}, retrying",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RecoveryAction::Degrade(msg) | RecoveryAction::Abort(msg) => {
                    tracing::warn!(tool = tool_name, "{}", msg);
                    return Err(err);
                }
            }
        }
    }

    async fn invoke_once(
        &self,
        tool_name: &str,
        args: Value,
        budget: Duration,
        attempt: u32,
    ) -> Result<Value, ToolError> {
        let Some(tool) = self.registry.get(tool_name) else {
            return Err(ToolError::Unavailable(tool_name.to_string()));
        };
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(budget, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "attempt": attempt + 1,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ToolError::Execution {
                tool: tool_name.to_string(),
                message,
            }),
            Err(_) => Err(ToolError::Timeout {
                tool: tool_name.to_string(),
                timeout_ms: budget.as_millis() as u64,
            }),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Backoff, Tool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "never answers in time"
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    /// 前 n 次失败，之后成功
    struct FlakyTool {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "fails a few times"
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err("upstream 503".to_string())
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        }
    }

    fn fast_policy(max_retries: u32) -> ToolPolicy {
        ToolPolicy::default()
            .with_timeout(Duration::from_millis(20))
            .with_max_retries(max_retries)
            .with_backoff(Backoff::Fixed { delay_ms: 1 })
    }

    #[tokio::test]
    async fn test_unknown_tool_is_unavailable() {
        let executor = ToolExecutor::new(ToolRegistry::new(), fast_policy(0));
        let err = executor
            .invoke_with_retry("missing", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Unavailable("missing".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_is_enforced_by_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::new(registry, fast_policy(0));
        let started = Instant::now();
        let err = executor.invoke("slow", Value::Null, None).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_ms: 20, .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(FlakyTool {
            failures: 2,
            calls: calls.clone(),
        });
        let executor = ToolExecutor::new(registry, fast_policy(2));
        let value = executor.invoke_with_retry("flaky", Value::Null).await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_policy_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(FlakyTool {
            failures: 10,
            calls: calls.clone(),
        });
        let executor =
            ToolExecutor::new(registry, fast_policy(5)).with_policy("flaky", fast_policy(1));
        let err = executor.invoke_with_retry("flaky", Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
