use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::StoreError;
use crate::store::{RunRecord, RunStore};

/// 进程内存储
#[derive(Default)]
pub struct InMemoryRunStore {
    records: RwLock<HashMap<String, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, record: RunRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.run_id.clone(), record);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.records.read().await.get(run_id).cloned())
    }
}
