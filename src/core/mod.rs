//! 核心编排层：请求与状态、路由信号、错误与恢复、运行登记、Supervisor 状态机

pub mod builder;
pub mod error;
pub mod events;
pub mod recovery;
pub mod request;
pub mod routing;
pub mod run_registry;
pub mod state;
pub mod supervisor;

pub use builder::{create_llm_from_config, create_planner_builder, create_store_from_config, PlannerBuilder};
pub use error::{PlannerError, RecoveryAction, RequestError, RunFailure, StoreError, ToolError};
pub use events::RunEvent;
pub use recovery::RecoveryEngine;
pub use request::{PlanRequest, PreferenceValue, ANONYMOUS_SCOPE};
pub use routing::{RoutingSignal, StageName};
pub use run_registry::RunRegistry;
pub use state::{
    citation_identity, format_clock, parse_clock, round_cents, Activity, Citation, ComplianceFlag,
    CostBreakdown, DayDraft, Finding, FindingKind, GeoPoint, MealPlan, PlanningState, PointOfInterest,
    ResearchMarker, RunStatus, Severity, StageOutcome, StageRecord,
};
pub use supervisor::{RunControl, Supervisor};
