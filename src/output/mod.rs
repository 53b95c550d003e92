//! 对账与输出：最终响应、JSON Schema、流式讲解

pub mod narration;
pub mod reconcile;
pub mod response;
pub mod schema;

pub use narration::narrate;
pub use reconcile::reconcile;
pub use response::{format_duration, CostSummary, DayPlan, ItineraryResponse, PlannedActivity, Tour};
pub use schema::{request_schema_json, response_schema_json};
