//! 运行过程事件：用于 SSE / WebSocket 展示阶段进度
//!
//! 接收端被丢弃时发送静默失败，不影响运行本身。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::{ComplianceFlag, RunStatus, StageName};

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 状态迁移
    StatusChanged { run_id: String, status: RunStatus },
    /// 开始调用某阶段（step 从 1 开始）
    StageStarted {
        run_id: String,
        stage: StageName,
        step: u32,
        max_steps: u32,
    },
    /// 阶段返回路由信号
    StageFinished {
        run_id: String,
        stage: StageName,
        signal: String,
    },
    /// 阶段请求重试
    Retry {
        run_id: String,
        stage: StageName,
        retry_count: u32,
        budget: u32,
    },
    /// 新增合规标记
    FlagRaised { run_id: String, flag: ComplianceFlag },
    /// 运行失败
    Failed { run_id: String, reason: String },
    /// 对账完成
    Completed { run_id: String },
}

pub(crate) fn send_event(tx: Option<&mpsc::UnboundedSender<RunEvent>>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
