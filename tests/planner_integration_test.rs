//! 规划器端到端测试：通过 PlannerBuilder 组装完整的五阶段流水线

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wayfarer::config::{AppConfig, ToolPolicyOverride};
use wayfarer::core::{
    PlanRequest, PlannerError, PlanningState, RoutingSignal, RunEvent, RunStatus, Severity, StageName, StageOutcome,
};
use wayfarer::retrieval::{InMemoryRetriever, KnowledgeDocument, NoopRetriever, RetrievedSnippet, Retriever};
use wayfarer::stages::{Stage, StageContext};
use wayfarer::store::{InMemoryRunStore, RunStore, SqliteRunStore};
use wayfarer::{PlannerBuilder, TravelPlanner};

fn fast_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.tools.tool_timeout_ms = 500;
    cfg.tools.max_retries = 0;
    cfg.tools.backoff = "fixed".to_string();
    cfg.tools.backoff_base_ms = 0;
    cfg.llm.timeout_ms = 500;
    cfg
}

fn barcelona() -> InMemoryRetriever {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/barcelona.json");
    InMemoryRetriever::load_json(path).unwrap()
}

fn planner(cfg: AppConfig, retriever: Arc<dyn Retriever>) -> TravelPlanner {
    PlannerBuilder::new(cfg)
        .with_retriever(retriever)
        .with_store(Arc::new(InMemoryRunStore::new()))
        .build()
        .unwrap()
}

/// 每次查询都睡过头的检索协作方
struct SlowRetriever(Duration);

#[async_trait]
impl Retriever for SlowRetriever {
    async fn query(&self, _text: &str, _scope: &str, _top_k: usize) -> Result<Vec<RetrievedSnippet>, String> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }
}

/// 永远要求重试自己的阶段
struct AlwaysRetry(StageName);

#[async_trait]
impl Stage for AlwaysRetry {
    fn name(&self) -> StageName {
        self.0
    }

    async fn run(&self, _state: &mut PlanningState, _ctx: &StageContext) -> RoutingSignal {
        RoutingSignal::Retry(self.0)
    }
}

#[tokio::test]
async fn test_barcelona_three_day_trip() {
    let p = planner(fast_config(), Arc::new(barcelona()));
    let request = PlanRequest::new("Barcelona", "Spain", 3)
        .with_budget(1500.0)
        .with_preference("culture", true)
        .with_preference("food", true)
        .with_preference("beach", true);

    let resp = p.generate_itinerary(request).await.unwrap();
    assert_eq!(resp.status, RunStatus::Completed);
    assert_eq!(resp.tour.daily_plans.len(), 3);
    assert_eq!(resp.tour.title, "3-Day Barcelona Itinerary");
    assert!(!resp.tour.daily_plans[0].plan.is_empty());
    assert!(resp.tour.daily_plans.iter().all(|d| !d.meals.dinner.as_deref().unwrap_or("").is_empty()));

    let report = p.get_run_status(&resp.run_id).await.unwrap();
    let over_budget_warned = report
        .stage_history
        .iter()
        .flat_map(|r| r.flags.iter())
        .any(|f| f.severity == Severity::Warning);
    assert!(resp.cost.total <= 1500.0 || over_budget_warned);
    assert_eq!(resp.cost.within_budget, resp.cost.total <= 1500.0);

    // 对账后的总额等于各类别之和
    let sum: f64 = resp.cost.categories.values().sum();
    assert!((sum - resp.cost.total).abs() < 0.01);
}

#[tokio::test]
async fn test_citations_are_unique_and_come_from_retrieved_sources() {
    let p = planner(fast_config(), Arc::new(barcelona()));
    let resp = p
        .generate_itinerary(PlanRequest::new("Barcelona", "Spain", 2).with_preference("culture", true))
        .await
        .unwrap();

    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/barcelona.json");
    let docs: Vec<KnowledgeDocument> = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let sources: HashSet<String> = docs.into_iter().map(|d| d.source).collect();

    assert!(!resp.citations.is_empty());
    let unique: HashSet<&String> = resp.citations.iter().collect();
    assert_eq!(unique.len(), resp.citations.len());
    assert!(resp.citations.iter().all(|c| sources.contains(c)));
    // 其他用户的私有笔记不会出现
    assert!(!resp.citations.iter().any(|c| c.starts_with("notes://")));
}

#[tokio::test]
async fn test_slow_retrieval_degrades_but_completes() {
    let mut cfg = fast_config();
    cfg.tools.per_tool.insert(
        "retrieval_query".to_string(),
        ToolPolicyOverride {
            timeout_ms: Some(50),
            ..Default::default()
        },
    );
    let p = planner(cfg, Arc::new(SlowRetriever(Duration::from_millis(300))));

    let resp = p
        .generate_itinerary(PlanRequest::new("Tokyo", "Japan", 2))
        .await
        .unwrap();
    assert_eq!(resp.status, RunStatus::Completed);
    assert_eq!(resp.tour.daily_plans.len(), 2);

    let report = p.get_run_status(&resp.run_id).await.unwrap();
    let warnings: Vec<&str> = report
        .stage_history
        .iter()
        .flat_map(|r| r.flags.iter())
        .filter(|f| f.severity == Severity::Warning)
        .map(|f| f.message.as_str())
        .collect();
    assert!(warnings.iter().any(|m| m.starts_with("research degraded")));
    assert!(report
        .stage_history
        .iter()
        .any(|r| r.stage == "researcher" && matches!(r.outcome, StageOutcome::Retry { .. })));
}

#[tokio::test]
async fn test_destination_wide_restriction_fails_without_a_tour() {
    let retriever = InMemoryRetriever::new();
    retriever.add_public(
        "Entry restricted: Atlantis is closed to foreign visitors this season.",
        "https://advisories.example/atlantis",
    );
    let p = planner(fast_config(), Arc::new(retriever));

    let err = p
        .generate_itinerary(PlanRequest::new("Atlantis", "Oceania", 2))
        .await
        .unwrap_err();
    let failure = match err {
        PlannerError::RunFailed(f) => f,
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(failure.reason, "compliance blocked");
    // 先尝试一次纠正性重排，再终止
    assert!(failure
        .stage_history
        .iter()
        .any(|r| r.stage == "compliance" && r.outcome == StageOutcome::Retry { stage: StageName::Logistics }));
    // 终止那一步重新检测到的阻断写在 detail 里
    let abort = failure
        .stage_history
        .iter()
        .find(|r| matches!(r.outcome, StageOutcome::Abort { .. }))
        .unwrap();
    assert_eq!(abort.stage, "compliance");
    assert!(abort
        .detail
        .as_deref()
        .unwrap()
        .contains("BLOCKING: entry restricted"));

    let report = p.get_run_status(&failure.run_id).await.unwrap();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.reason.as_deref(), Some("compliance blocked"));
}

#[tokio::test]
async fn test_always_retrying_stage_is_bounded() {
    let p = PlannerBuilder::new(fast_config())
        .with_retriever(Arc::new(NoopRetriever))
        .with_store(Arc::new(InMemoryRunStore::new()))
        .with_stage(Arc::new(AlwaysRetry(StageName::Experience)))
        .build()
        .unwrap();

    let err = p
        .generate_itinerary(PlanRequest::new("Oslo", "Norway", 1))
        .await
        .unwrap_err();
    match err {
        PlannerError::RunFailed(f) => {
            assert_eq!(f.reason, "retry budget exhausted");
            assert!(f.stage_history.len() <= 20);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_empty_knowledge_still_completes() {
    let p = planner(fast_config(), Arc::new(NoopRetriever));
    let resp = p
        .generate_itinerary(PlanRequest::new("Reykjavik", "Iceland", 2))
        .await
        .unwrap();
    assert_eq!(resp.status, RunStatus::Completed);
    assert!(resp.citations.is_empty());
    assert!(resp
        .tour
        .notices
        .iter()
        .any(|f| f.message == "no research findings for Reykjavik"));
}

#[tokio::test]
async fn test_no_findings_and_no_generic_activities_aborts() {
    let mut cfg = fast_config();
    cfg.logistics.generic_activities = false;
    let p = planner(cfg, Arc::new(NoopRetriever));
    let err = p
        .generate_itinerary(PlanRequest::new("Reykjavik", "Iceland", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, PlannerError::RunFailed(f) if f.reason == "insufficient data"));
}

#[tokio::test]
async fn test_cancel_takes_effect_at_the_next_boundary() {
    let mut cfg = fast_config();
    cfg.tools.tool_timeout_ms = 2_000;
    let p = planner(cfg, Arc::new(SlowRetriever(Duration::from_millis(200))));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let (run_id, handle) = p
        .submit(PlanRequest::new("Tokyo", "Japan", 2), Some(tx))
        .await
        .unwrap();
    assert!(p.get_run_status(&run_id).await.unwrap().live);
    assert!(p.cancel(&run_id).await);

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, PlannerError::RunFailed(ref f) if f.reason == "cancelled"));
    assert_eq!(p.live_runs().await, 0);

    let mut saw_failed = false;
    while let Ok(ev) = rx.try_recv() {
        if let RunEvent::Failed { reason, .. } = ev {
            assert_eq!(reason, "cancelled");
            saw_failed = true;
        }
    }
    assert!(saw_failed);
    assert_eq!(p.get_run_status(&run_id).await.unwrap().status, RunStatus::Failed);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_state() {
    let p = planner(fast_config(), Arc::new(barcelona()));
    let mut handles = Vec::new();
    for days in 1..=4u32 {
        let p = p.clone();
        handles.push(tokio::spawn(async move {
            p.generate_itinerary(PlanRequest::new("Barcelona", "Spain", days)).await
        }));
    }

    let mut run_ids = HashSet::new();
    for (i, h) in handles.into_iter().enumerate() {
        let resp = h.await.unwrap().unwrap();
        assert_eq!(resp.tour.daily_plans.len(), i + 1);
        run_ids.insert(resp.run_id);
    }
    assert_eq!(run_ids.len(), 4);
    assert_eq!(p.live_runs().await, 0);
}

#[tokio::test]
async fn test_status_survives_in_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("runs.db");
    let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::open(&db).unwrap());
    let p = PlannerBuilder::new(fast_config())
        .with_retriever(Arc::new(barcelona()))
        .with_store(store)
        .build()
        .unwrap();
    let resp = p
        .generate_itinerary(PlanRequest::new("Barcelona", "Spain", 1))
        .await
        .unwrap();

    // 新开连接读取同一文件
    let reopened = SqliteRunStore::open(&db).unwrap();
    let record = reopened.load(&resp.run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.response.unwrap().tour.daily_plans.len(), 1);
    assert!(record.stage_history.iter().any(|r| r.stage == "reconciliation"));
}
