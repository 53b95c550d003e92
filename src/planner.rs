//! 服务门面：generate_itinerary / get_run_status / cancel
//!
//! 每次请求生成独立的 run_id 与 PlanningState，多个运行可以在不同任务上并发执行；
//! 工具注册表、LLM 与存储在运行之间共享。运行结束（无论成败）后把记录交给存储，
//! 保存失败只记日志，不影响调用方拿到的结果。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::core::{
    PlanRequest, PlannerError, PlanningState, RunControl, RunEvent, RunRegistry, RunStatus, StageRecord,
    Supervisor,
};
use crate::llm::LlmClient;
use crate::output::ItineraryResponse;
use crate::store::{RunRecord, RunStore};

/// get_run_status 的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusReport {
    pub run_id: String,
    pub status: RunStatus,
    /// 失败原因
    pub reason: Option<String>,
    /// 进行中的运行为空，结束后来自存储
    pub stage_history: Vec<StageRecord>,
    /// 是否仍在进行中
    pub live: bool,
}

struct PlannerInner {
    supervisor: Supervisor,
    store: Arc<dyn RunStore>,
    registry: RunRegistry,
}

/// 行程规划服务（可 Clone，内部共享）
#[derive(Clone)]
pub struct TravelPlanner {
    inner: Arc<PlannerInner>,
}

impl TravelPlanner {
    pub fn new(supervisor: Supervisor, store: Arc<dyn RunStore>) -> Self {
        Self {
            inner: Arc::new(PlannerInner {
                supervisor,
                store,
                registry: RunRegistry::new(),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.supervisor.context().config
    }

    pub fn llm(&self) -> Arc<dyn LlmClient> {
        self.inner.supervisor.context().llm.clone()
    }

    /// 同步（对调用方而言）地跑完整个状态机
    pub async fn generate_itinerary(&self, request: PlanRequest) -> Result<ItineraryResponse, PlannerError> {
        self.generate_itinerary_with_events(request, None).await
    }

    /// 同上，并把过程事件推送到 events
    pub async fn generate_itinerary_with_events(
        &self,
        request: PlanRequest,
        events: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> Result<ItineraryResponse, PlannerError> {
        request.validate(self.config().app.max_trip_days)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let control = self.register(&run_id, events).await;
        self.execute(run_id, request, control).await
    }

    /// 在后台任务上启动运行，立即返回 run_id（此时已可按 run_id 查询或取消）
    pub async fn submit(
        &self,
        request: PlanRequest,
        events: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> Result<(String, JoinHandle<Result<ItineraryResponse, PlannerError>>), PlannerError> {
        request.validate(self.config().app.max_trip_days)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let control = self.register(&run_id, events).await;
        let planner = self.clone();
        let id = run_id.clone();
        let handle = tokio::spawn(async move { planner.execute(id, request, control).await });
        Ok((run_id, handle))
    }

    async fn register(&self, run_id: &str, events: Option<mpsc::UnboundedSender<RunEvent>>) -> RunControl {
        let (cancel, status_tx) = self.inner.registry.register(run_id).await;
        let deadline = self
            .config()
            .orchestrator
            .run_deadline()
            .map(|d| Instant::now() + d);
        RunControl::new(cancel)
            .with_deadline(deadline)
            .with_status(status_tx)
            .with_events(events)
    }

    async fn execute(
        &self,
        run_id: String,
        request: PlanRequest,
        control: RunControl,
    ) -> Result<ItineraryResponse, PlannerError> {
        tracing::info!(run_id = %run_id, city = %request.city, days = request.days, "run started");
        let mut state = PlanningState::new(run_id.clone(), request.clone(), &self.config().app.default_currency);
        let outcome = self.inner.supervisor.drive(&mut state, &control).await;

        let record = RunRecord {
            run_id: run_id.clone(),
            request,
            status: state.status(),
            reason: outcome.as_ref().err().map(|f| f.reason.clone()),
            response: outcome.as_ref().ok().cloned(),
            stage_history: state.history().to_vec(),
            finished_at: chrono::Utc::now(),
        };
        if let Err(e) = self.inner.store.save(record).await {
            tracing::error!(run_id = %run_id, "failed to persist run: {}", e);
        }
        self.inner.registry.finish(&run_id).await;
        outcome.map_err(PlannerError::from)
    }

    /// 进行中的运行从登记表回答，已结束的从存储回答
    pub async fn get_run_status(&self, run_id: &str) -> Result<RunStatusReport, PlannerError> {
        if let Some(status) = self.inner.registry.status(run_id).await {
            return Ok(RunStatusReport {
                run_id: run_id.to_string(),
                status,
                reason: None,
                stage_history: Vec::new(),
                // 对账结束到注销之间，登记表里已经是终态
                live: !status.is_terminal(),
            });
        }
        match self.inner.store.load(run_id).await? {
            Some(record) => Ok(RunStatusReport {
                run_id: record.run_id,
                status: record.status,
                reason: record.reason,
                stage_history: record.stage_history,
                live: false,
            }),
            None => Err(PlannerError::RunNotFound(run_id.to_string())),
        }
    }

    /// 请求取消；在下一个阶段边界生效。运行不存在或已结束时返回 false
    pub async fn cancel(&self, run_id: &str) -> bool {
        let found = self.inner.registry.cancel(run_id).await;
        if found {
            tracing::info!(run_id = %run_id, "cancellation requested");
        }
        found
    }

    pub async fn live_runs(&self) -> usize {
        self.inner.registry.live_runs().await
    }

    /// 取消所有进行中的运行
    pub fn shutdown(&self) {
        self.inner.registry.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PlannerBuilder;
    use crate::store::InMemoryRunStore;

    fn planner() -> TravelPlanner {
        PlannerBuilder::new(AppConfig::default())
            .with_store(Arc::new(InMemoryRunStore::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_a_run_exists() {
        let p = planner();
        let err = p
            .generate_itinerary(PlanRequest::new("Oslo", "Norway", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidRequest(_)));
        assert_eq!(p.live_runs().await, 0);
    }

    #[tokio::test]
    async fn test_finished_run_status_comes_from_store() {
        let p = planner();
        let resp = p
            .generate_itinerary(PlanRequest::new("Oslo", "Norway", 1))
            .await
            .unwrap();
        let report = p.get_run_status(&resp.run_id).await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert!(!report.live);
        assert!(report.reason.is_none());
        assert!(!report.stage_history.is_empty());

        assert!(matches!(
            p.get_run_status("nope").await,
            Err(PlannerError::RunNotFound(_))
        ));
        assert!(!p.cancel(&resp.run_id).await);
    }
}
