//! 工具调用策略：超时、最大重试次数与退避方式
//!
//! 每个工具可以声明自己的策略，配置中的 per_tool 覆盖优先；退避时长始终有上界。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 退避方式：固定间隔或指数增长（有上限）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// 第 attempt 次失败（从 0 开始）之后的等待时长
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// 单个工具的调用策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPolicy {
    /// 注册表强制执行的超时，工具自身无需处理
    pub timeout: Duration,
    /// 首次调用之外最多重试几次
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff: Backoff::Exponential {
                base_ms: 200,
                max_ms: 2_000,
            },
        }
    }
}

impl ToolPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_bounded() {
        let b = Backoff::Exponential {
            base_ms: 100,
            max_ms: 1_000,
        };
        assert_eq!(b.delay(0), Duration::from_millis(100));
        assert_eq!(b.delay(1), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(800));
        assert_eq!(b.delay(4), Duration::from_millis(1_000));
        assert_eq!(b.delay(200), Duration::from_millis(1_000));
    }

    #[test]
    fn test_fixed_backoff() {
        let b = Backoff::Fixed { delay_ms: 50 };
        assert_eq!(b.delay(0), b.delay(9));
    }
}
