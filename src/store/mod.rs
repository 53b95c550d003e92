//! 持久化协作方：按 run_id 保存运行结束时的记录，供之后的状态查询
//!
//! 运行过程中编排器只写不读；内存实现用于测试与单进程部署，SQLite 实现用于 CLI 跨进程查询。

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{PlanRequest, RunStatus, StageRecord, StoreError};
use crate::output::ItineraryResponse;

pub use memory::InMemoryRunStore;
pub use sqlite::SqliteRunStore;

/// 一次运行的最终记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub request: PlanRequest,
    pub status: RunStatus,
    /// 失败原因；成功时为 None
    pub reason: Option<String>,
    pub response: Option<ItineraryResponse>,
    pub stage_history: Vec<StageRecord>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// 保存（同一 run_id 覆盖旧记录）
    async fn save(&self, record: RunRecord) -> Result<(), StoreError>;

    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError>;
}
