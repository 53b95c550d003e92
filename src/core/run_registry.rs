//! 运行登记：进行中运行的取消令牌与实时状态
//!
//! 根 CancellationToken 关闭时所有运行一起取消；每个运行持有子 token，可按 run_id 单独取消。
//! 状态通过 watch 通道由 Supervisor 推送，查询方只读最新值。

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::core::RunStatus;

struct LiveRun {
    cancel: CancellationToken,
    status: watch::Receiver<RunStatus>,
}

/// 进行中运行的生命周期管理：取消令牌与状态快照
pub struct RunRegistry {
    root: CancellationToken,
    runs: RwLock<HashMap<String, LiveRun>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// 登记新运行，返回其取消令牌与状态发送端
    pub async fn register(&self, run_id: &str) -> (CancellationToken, watch::Sender<RunStatus>) {
        let cancel = self.root.child_token();
        let (tx, rx) = watch::channel(RunStatus::Pending);
        self.runs.write().await.insert(
            run_id.to_string(),
            LiveRun {
                cancel: cancel.clone(),
                status: rx,
            },
        );
        (cancel, tx)
    }

    /// 取消指定运行；运行不存在（或已结束）时返回 false
    pub async fn cancel(&self, run_id: &str) -> bool {
        match self.runs.read().await.get(run_id) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn status(&self, run_id: &str) -> Option<RunStatus> {
        self.runs
            .read()
            .await
            .get(run_id)
            .map(|run| *run.status.borrow())
    }

    /// 运行结束后注销
    pub async fn finish(&self, run_id: &str) {
        self.runs.write().await.remove(run_id);
    }

    pub async fn live_runs(&self) -> usize {
        self.runs.read().await.len()
    }

    /// 取消所有进行中的运行（进程退出时）
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_status_and_finish() {
        let registry = RunRegistry::new();
        let (_token, tx) = registry.register("r1").await;
        assert_eq!(registry.status("r1").await, Some(RunStatus::Pending));
        tx.send(RunStatus::Researching).unwrap();
        assert_eq!(registry.status("r1").await, Some(RunStatus::Researching));
        registry.finish("r1").await;
        assert_eq!(registry.status("r1").await, None);
        assert!(!registry.cancel("r1").await);
    }

    #[tokio::test]
    async fn test_cancel_is_per_run_and_shutdown_cancels_all() {
        let registry = RunRegistry::new();
        let (a, _ta) = registry.register("a").await;
        let (b, _tb) = registry.register("b").await;
        assert!(registry.cancel("a").await);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        registry.shutdown();
        assert!(b.is_cancelled());
        assert_eq!(registry.live_runs().await, 2);
    }
}
