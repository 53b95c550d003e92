//! Researcher：检索景点、营业时间、季节与签证信息
//!
//! 通过 retrieval_query 工具查询检索协作方（按用户作用域过滤），可选追加 web_search。
//! 检索为空不算失败：标记 NoFindings 后继续；只有暂时性错误才会在预算内请求重跑，
//! 预算耗尽后带 WARNING 降级继续。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{
    parse_clock, Citation, ComplianceFlag, Finding, FindingKind, GeoPoint, PlanningState,
    PointOfInterest, ResearchMarker, RoutingSignal, Severity, StageName, ToolError,
};
use crate::retrieval::RetrievedSnippet;
use crate::stages::{Stage, StageContext};
use crate::tools::{RETRIEVAL_TOOL, SEARCH_TOOL};

pub struct ResearcherStage;

/// 单个景点时长上限（一整天）
const MAX_ACTIVITY_MINUTES: f64 = 24.0 * 60.0;

/// 检索查询：城市 + 国家 + 偏好 + 固定的研究主题
fn build_query(state: &PlanningState) -> String {
    let req = state.request();
    let mut parts = vec![req.city.clone(), req.country.clone()];
    parts.extend(req.enabled_preferences().into_iter().map(str::to_string));
    parts.push("points of interest opening hours seasonal visa".to_string());
    parts.join(" ")
}

fn parse_snippets(value: Value) -> Result<Vec<RetrievedSnippet>, ToolError> {
    serde_json::from_value(value).map_err(|e| ToolError::Execution {
        tool: RETRIEVAL_TOOL.to_string(),
        message: format!("malformed retrieval result: {}", e),
    })
}

/// 带 name 元数据的片段视为可安排的景点，其余作为说明性文字
pub(crate) fn snippet_to_finding(s: RetrievedSnippet, city: &str) -> Finding {
    let meta = &s.metadata;
    let num = |k: &str| meta.get(k).and_then(|v| v.trim().parse::<f64>().ok());
    let kind = match meta.get("name").filter(|n| !n.trim().is_empty()) {
        Some(name) => {
            let coordinates = match (num("lat"), num("lon")) {
                (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
                _ => None,
            };
            FindingKind::PointOfInterest(PointOfInterest {
                name: name.trim().to_string(),
                location: meta
                    .get("location")
                    .cloned()
                    .unwrap_or_else(|| city.to_string()),
                coordinates,
                duration_minutes: num("duration_min")
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .map(|d| d.min(MAX_ACTIVITY_MINUTES) as u32),
                cost: num("cost").filter(|c| *c >= 0.0).unwrap_or(0.0),
                currency: meta.get("currency").map(|c| c.to_uppercase()),
                category: meta.get("category").map(|c| c.to_lowercase()),
                opens: meta.get("opens").and_then(|v| parse_clock(v)),
                closes: meta.get("closes").and_then(|v| parse_clock(v)),
                media: meta.get("media").cloned(),
            })
        }
        None => FindingKind::Note,
    };
    Finding {
        snippet: s.snippet,
        citation: Citation::new(s.source_citation, StageName::Researcher),
        score: s.score,
        kind,
    }
}

impl ResearcherStage {
    async fn retrieve(&self, state: &PlanningState, ctx: &StageContext) -> Result<Vec<RetrievedSnippet>, ToolError> {
        let args = serde_json::json!({
            "query": build_query(state),
            "user_scope": state.request().user_scope(),
            "top_k": ctx.config.research.top_k,
        });
        let value = ctx.tools.invoke_with_retry(RETRIEVAL_TOOL, args).await?;
        parse_snippets(value)
    }

    /// 网页搜索只做补充，失败直接忽略
    async fn search(&self, state: &PlanningState, ctx: &StageContext) -> Vec<RetrievedSnippet> {
        if !ctx.config.research.web_search || !ctx.tools.has_tool(SEARCH_TOOL) {
            return Vec::new();
        }
        let req = state.request();
        let args = serde_json::json!({
            "query": format!("{} {} opening hours seasonal tips", req.city, req.country),
        });
        match ctx.tools.invoke_with_retry(SEARCH_TOOL, args).await.and_then(parse_snippets) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(run_id = %state.run_id(), "web search skipped: {}", e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Stage for ResearcherStage {
    fn name(&self) -> StageName {
        StageName::Researcher
    }

    async fn run(&self, state: &mut PlanningState, ctx: &StageContext) -> RoutingSignal {
        let snippets = match self.retrieve(state, ctx).await {
            Ok(s) => s,
            Err(e) => {
                let budget = ctx.config.orchestrator.retry_budget(StageName::Researcher);
                if e.is_transient() && state.retry_count(StageName::Researcher) < budget {
                    tracing::warn!(run_id = %state.run_id(), "retrieval failed: {}, requesting rerun", e);
                    return RoutingSignal::Retry(StageName::Researcher);
                }
                tracing::warn!(run_id = %state.run_id(), "research degraded: {}", e);
                state.research_marker = ResearchMarker::Degraded;
                state.raise(ComplianceFlag::new(
                    Severity::Warning,
                    format!("research degraded: {}", e),
                    StageName::Researcher,
                ));
                return RoutingSignal::Continue(StageName::Logistics);
            }
        };

        let extra = self.search(state, ctx).await;
        let city = state.request().city.clone();
        let mut appended = 0usize;
        for s in snippets.into_iter().chain(extra) {
            if s.source_citation.trim().is_empty() {
                continue;
            }
            state.append_finding(snippet_to_finding(s, &city));
            appended += 1;
        }

        if appended == 0 {
            state.research_marker = ResearchMarker::NoFindings;
            state.raise(ComplianceFlag::new(
                Severity::Info,
                format!("no research findings for {}", city),
                StageName::Researcher,
            ));
        } else {
            state.research_marker = ResearchMarker::Found;
        }
        tracing::info!(run_id = %state.run_id(), findings = appended, "research finished");
        RoutingSignal::Continue(StageName::Logistics)
    }
}
