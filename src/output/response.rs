//! 对外响应结构：{run_id, tour, cost, citations, status}

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{ComplianceFlag, MealPlan, RunStatus};

/// generate_itinerary 的成功结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItineraryResponse {
    pub run_id: String,
    pub tour: Tour,
    pub cost: CostSummary,
    /// 去重后的来源（保留首次出现顺序）
    pub citations: Vec<String>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Tour {
    pub title: String,
    pub description: String,
    pub city: String,
    pub country: String,
    pub days: u32,
    /// 每个请求日恰好一项
    pub daily_plans: Vec<DayPlan>,
    /// 运行过程中记录的合规标记
    #[serde(default)]
    pub notices: Vec<ComplianceFlag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DayPlan {
    pub day: u32,
    pub theme: String,
    pub plan: Vec<PlannedActivity>,
    /// 如 "3.2 km"
    pub estimated_walking: String,
    pub walking_km: f64,
    pub tips: String,
    pub meals: MealPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedActivity {
    /// HH:MM
    pub time: String,
    pub activity: String,
    pub location: String,
    /// 如 "1h 30m"
    pub duration: String,
    pub duration_minutes: u32,
    pub description: String,
    #[serde(default)]
    pub media: Vec<String>,
    pub estimated_cost: f64,
    pub citation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostSummary {
    pub currency: String,
    pub categories: BTreeMap<String, f64>,
    /// 由类别求和得到
    pub total: f64,
    pub budget: Option<f64>,
    pub within_budget: bool,
}

/// 分钟数格式化为 "1h 30m" / "45m"
pub fn format_duration(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
