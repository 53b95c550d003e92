//! 规划状态：一次运行内被各阶段依次读写的唯一记录
//!
//! PlanningState 由 Supervisor 独占，按 `&mut` 传给当前阶段；阶段返回后不再持有引用。
//! research_findings、citations、stage_history 只追加；compliance_flags 按 (severity, message) 去重。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{PlanRequest, StageName};

/// 运行状态（对外序列化为小写，如 "completed"）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Researching,
    PlanningLogistics,
    CheckingCompliance,
    GeneratingExperience,
    Reconciling,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Researching => "researching",
            RunStatus::PlanningLogistics => "planning_logistics",
            RunStatus::CheckingCompliance => "checking_compliance",
            RunStatus::GeneratingExperience => "generating_experience",
            RunStatus::Reconciling => "reconciling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// 合规标记级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Blocking,
}

/// 合规标记：(severity, message) 唯一，raised_by 仅用于审计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComplianceFlag {
    pub severity: Severity,
    pub message: String,
    pub raised_by: StageName,
}

impl ComplianceFlag {
    pub fn new(severity: Severity, message: impl Into<String>, raised_by: StageName) -> Self {
        Self {
            severity,
            message: message.into(),
            raised_by,
        }
    }
}

/// 来源引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 来源标识（URL 或文档 ID）
    pub source: String,
    /// 首次引入该来源的阶段
    pub stage: StageName,
}

impl Citation {
    pub fn new(source: impl Into<String>, stage: StageName) -> Self {
        Self {
            source: source.into(),
            stage,
        }
    }

    /// 去重用的来源身份：忽略大小写、首尾空白与末尾斜杠
    pub fn identity(&self) -> String {
        citation_identity(&self.source)
    }
}

pub fn citation_identity(source: &str) -> String {
    source.trim().trim_end_matches('/').to_lowercase()
}

/// 经纬度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// 可安排的景点 / 活动候选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub name: String,
    pub location: String,
    pub coordinates: Option<GeoPoint>,
    pub duration_minutes: Option<u32>,
    /// 门票等费用（currency 币种）
    pub cost: f64,
    pub currency: Option<String>,
    pub category: Option<String>,
    /// 开放时间，距零点分钟数
    pub opens: Option<u32>,
    pub closes: Option<u32>,
    pub media: Option<String>,
}

/// 检索结果的类型：可安排的景点，或只是说明性文字（营业时间、季节、签证等）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingKind {
    PointOfInterest(PointOfInterest),
    Note,
}

/// 一条研究结果：片段 + 来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub snippet: String,
    pub citation: Citation,
    /// 检索置信度（越大越相关）
    pub score: f32,
    pub kind: FindingKind,
}

impl Finding {
    pub fn point_of_interest(&self) -> Option<&PointOfInterest> {
        match &self.kind {
            FindingKind::PointOfInterest(poi) => Some(poi),
            FindingKind::Note => None,
        }
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.snippet.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// 研究阶段的结论标记，供下游区分「没有结果」与「检索降级」
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMarker {
    #[default]
    Pending,
    Found,
    NoFindings,
    Degraded,
}

/// 一个时间段内的活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// 开始时间，距零点分钟数
    pub start_minute: u32,
    pub name: String,
    pub location: String,
    pub duration_minutes: u32,
    /// 请求币种下的预估费用
    pub estimated_cost: f64,
    pub citation: Option<String>,
    pub category: Option<String>,
    pub coordinates: Option<GeoPoint>,
    /// 距上一活动的移动分钟数
    pub travel_minutes: u32,
    /// Experience 阶段补充的描述
    pub description: Option<String>,
    pub media: Vec<String>,
}

impl Activity {
    pub fn end_minute(&self) -> u32 {
        self.start_minute.saturating_add(self.duration_minutes)
    }
}

/// 三餐建议（只做标注，不计费）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MealPlan {
    pub breakfast: Option<String>,
    pub lunch: Option<String>,
    pub dinner: Option<String>,
}

/// 某一天的草稿行程；activities 的顺序与时间只由 Logistics 决定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDraft {
    /// 从 1 开始
    pub day: u32,
    pub activities: Vec<Activity>,
    pub walking_km: f64,
    pub theme: Option<String>,
    pub tips: Option<String>,
    pub meals: Option<MealPlan>,
}

impl DayDraft {
    pub fn empty(day: u32) -> Self {
        Self {
            day,
            activities: Vec::new(),
            walking_km: 0.0,
            theme: None,
            tips: None,
            meals: None,
        }
    }
}

/// 费用明细：类别 -> 金额，外加阶段上报的累计值
///
/// reported_total 只用于发现阶段算术漂移，对账时以类别求和为准。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub categories: BTreeMap<String, f64>,
    pub reported_total: f64,
}

impl CostBreakdown {
    /// 覆盖某类别金额（阶段重跑时不会重复累计）
    pub fn set(&mut self, category: impl Into<String>, amount: f64) {
        let category = category.into();
        let previous = self.categories.insert(category, amount).unwrap_or(0.0);
        self.reported_total += amount - previous;
    }

    /// 在某类别上累加
    pub fn add(&mut self, category: impl Into<String>, amount: f64) {
        *self.categories.entry(category.into()).or_insert(0.0) += amount;
        self.reported_total += amount;
    }

    pub fn get(&self, category: &str) -> f64 {
        self.categories.get(category).copied().unwrap_or(0.0)
    }

    /// 按类别重新求和（保留两位小数）
    pub fn recomputed_total(&self) -> f64 {
        round_cents(self.categories.values().sum())
    }
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// 阶段历史中的单次结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutcome {
    Continue { next: StageName },
    Retry { stage: StageName },
    Done,
    Abort { reason: String },
    /// Supervisor 层面的终止（取消、预算耗尽）
    Failed { reason: String },
    /// 对账完成
    Completed,
}

/// 阶段历史条目：只追加，用于失败诊断与状态查询
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// 阶段名，或 supervisor / reconciliation
    pub stage: String,
    pub outcome: StageOutcome,
    pub at: DateTime<Utc>,
    /// 记录时该阶段的重试计数
    pub retry_count: u32,
    /// 本次调用新增的合规标记
    #[serde(default)]
    pub flags: Vec<ComplianceFlag>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// 一次运行的可变核心记录
#[derive(Debug, Clone)]
pub struct PlanningState {
    run_id: String,
    request: PlanRequest,
    /// 报价币种（请求或配置默认）
    currency: String,
    research_findings: Vec<Finding>,
    pub research_marker: ResearchMarker,
    pub draft_itinerary: Vec<DayDraft>,
    compliance_flags: Vec<ComplianceFlag>,
    /// 本次阶段调用中被再次触发的已有标记，由 Supervisor 取走写入历史
    repeated_flags: Vec<ComplianceFlag>,
    pub cost_breakdown: CostBreakdown,
    citations: Vec<Citation>,
    stage_history: Vec<StageRecord>,
    status: RunStatus,
    retry_counts: HashMap<StageName, u32>,
    /// Experience 生成的整体描述
    pub tour_summary: Option<String>,
}

impl PlanningState {
    pub fn new(run_id: impl Into<String>, request: PlanRequest, default_currency: &str) -> Self {
        let currency = request.currency_or(default_currency).to_uppercase();
        Self {
            run_id: run_id.into(),
            request,
            currency,
            research_findings: Vec::new(),
            research_marker: ResearchMarker::Pending,
            draft_itinerary: Vec::new(),
            compliance_flags: Vec::new(),
            repeated_flags: Vec::new(),
            cost_breakdown: CostBreakdown::default(),
            citations: Vec::new(),
            stage_history: Vec::new(),
            status: RunStatus::Pending,
            retry_counts: HashMap::new(),
            tour_summary: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn request(&self) -> &PlanRequest {
        &self.request
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    pub fn findings(&self) -> &[Finding] {
        &self.research_findings
    }

    /// 追加研究结果，并把来源记入 citations
    pub fn append_finding(&mut self, finding: Finding) {
        self.citations.push(finding.citation.clone());
        self.research_findings.push(finding);
    }

    /// 阶段自有来源（非检索结果）
    pub fn cite(&mut self, citation: Citation) {
        self.citations.push(citation);
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    /// 按来源身份去重，保留最早出现的条目；重复调用结果不变
    pub(crate) fn dedupe_citations(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.citations.retain(|c| seen.insert(c.identity()));
    }

    pub fn flags(&self) -> &[ComplianceFlag] {
        &self.compliance_flags
    }

    /// 添加合规标记；(severity, message) 已存在时不重复保存，只记为再次触发，返回是否新增
    pub fn raise(&mut self, flag: ComplianceFlag) -> bool {
        let exists = self
            .compliance_flags
            .iter()
            .any(|f| f.severity == flag.severity && f.message == flag.message);
        if exists {
            self.repeated_flags.push(flag);
            return false;
        }
        self.compliance_flags.push(flag);
        true
    }

    pub(crate) fn take_repeated_flags(&mut self) -> Vec<ComplianceFlag> {
        std::mem::take(&mut self.repeated_flags)
    }

    pub fn has_flag(&self, severity: Severity) -> bool {
        self.compliance_flags.iter().any(|f| f.severity == severity)
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.stage_history
    }

    pub(crate) fn record(&mut self, record: StageRecord) {
        self.stage_history.push(record);
    }

    pub fn retry_count(&self, stage: StageName) -> u32 {
        self.retry_counts.get(&stage).copied().unwrap_or(0)
    }

    /// 增加阶段重试计数并返回新值
    pub(crate) fn bump_retry(&mut self, stage: StageName) -> u32 {
        let n = self.retry_counts.entry(stage).or_insert(0);
        *n += 1;
        *n
    }

    /// 某阶段在历史中是否曾经发出过 RETRY
    pub fn stage_has_retried(&self, stage: StageName) -> bool {
        self.stage_history.iter().any(|r| {
            r.stage == stage.as_str() && matches!(r.outcome, StageOutcome::Retry { .. })
        })
    }
}

/// 分钟数格式化为 HH:MM
pub fn format_clock(minute: u32) -> String {
    format!("{:02}:{:02}", (minute / 60) % 24, minute % 60)
}

/// 解析 HH:MM 为分钟数
pub fn parse_clock(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (h < 24 && m < 60).then_some(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PlanningState {
        PlanningState::new("run-1", PlanRequest::new("Barcelona", "Spain", 3), "EUR")
    }

    #[test]
    fn test_cost_set_does_not_double_count() {
        let mut cost = CostBreakdown::default();
        cost.set("admission", 40.0);
        cost.set("admission", 25.0);
        cost.add("transport", 5.0);
        assert_eq!(cost.get("admission"), 25.0);
        assert_eq!(cost.reported_total, 30.0);
        assert_eq!(cost.recomputed_total(), 30.0);
    }

    #[test]
    fn test_flags_deduplicate_by_severity_and_message() {
        let mut s = state();
        assert!(s.raise(ComplianceFlag::new(Severity::Warning, "over budget", StageName::Compliance)));
        assert!(!s.raise(ComplianceFlag::new(Severity::Warning, "over budget", StageName::Decision)));
        assert!(s.raise(ComplianceFlag::new(Severity::Info, "over budget", StageName::Compliance)));
        assert_eq!(s.flags().len(), 2);
        assert!(s.has_flag(Severity::Warning));
        assert!(!s.has_flag(Severity::Blocking));

        let repeated = s.take_repeated_flags();
        assert_eq!(repeated.len(), 1);
        assert_eq!(repeated[0].raised_by, StageName::Decision);
        assert!(s.take_repeated_flags().is_empty());
    }

    #[test]
    fn test_only_completed_and_failed_are_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Reconciling.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn test_citation_dedupe_keeps_earliest_and_is_idempotent() {
        let mut s = state();
        s.cite(Citation::new("https://guide.example/sagrada", StageName::Researcher));
        s.cite(Citation::new("doc-7", StageName::Researcher));
        s.cite(Citation::new("HTTPS://guide.example/sagrada/", StageName::Experience));
        s.dedupe_citations();
        s.dedupe_citations();
        assert_eq!(s.citations().len(), 2);
        assert_eq!(s.citations()[0].stage, StageName::Researcher);
        assert_eq!(s.citations()[0].source, "https://guide.example/sagrada");
    }

    #[test]
    fn test_currency_defaults_and_retry_counts() {
        let mut s = state();
        assert_eq!(s.currency(), "EUR");
        assert_eq!(s.retry_count(StageName::Logistics), 0);
        assert_eq!(s.bump_retry(StageName::Logistics), 1);
        assert_eq!(s.bump_retry(StageName::Logistics), 2);
        assert_eq!(s.retry_count(StageName::Researcher), 0);

        let usd = PlanningState::new(
            "run-2",
            PlanRequest::new("Tokyo", "Japan", 2).with_currency("usd"),
            "EUR",
        );
        assert_eq!(usd.currency(), "USD");
    }

    #[test]
    fn test_clock_round_trip_edges() {
        assert_eq!(parse_clock("09:00"), Some(540));
        assert_eq!(parse_clock("24:00"), None);
        assert_eq!(parse_clock("nine"), None);
        assert_eq!(format_clock(545), "09:05");
    }
}
