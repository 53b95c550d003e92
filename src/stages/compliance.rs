//! Compliance：预算、签证与入境限制检查
//!
//! 超预算、缺少签证信息只记 WARNING；「entry restricted」记 BLOCKING。
//! 限制落在已排进草稿的景点上，或是针对整个目的地的说明时才算阻断。
//! 第一次阻断请求 Logistics 重排一次；重排后仍阻断则终止运行。

use async_trait::async_trait;

use crate::core::{ComplianceFlag, PlanningState, RoutingSignal, Severity, StageName};
use crate::stages::{Stage, StageContext, RESTRICTED_MARKER};

pub struct ComplianceStage;

/// 草稿中命中入境限制的来源（景点级），或目的地级限制说明
fn restriction(state: &PlanningState) -> Option<String> {
    let scheduled: Vec<&str> = state
        .draft_itinerary
        .iter()
        .flat_map(|d| d.activities.iter())
        .filter_map(|a| a.citation.as_deref())
        .collect();
    state
        .findings()
        .iter()
        .filter(|f| f.mentions(RESTRICTED_MARKER))
        .find(|f| match f.point_of_interest() {
            Some(_) => scheduled.contains(&f.citation.source.as_str()),
            None => true,
        })
        .map(|f| f.snippet.clone())
}

#[async_trait]
impl Stage for ComplianceStage {
    fn name(&self) -> StageName {
        StageName::Compliance
    }

    async fn run(&self, state: &mut PlanningState, _ctx: &StageContext) -> RoutingSignal {
        let total = state.cost_breakdown.recomputed_total();
        if let Some(budget) = state.request().budget {
            if total > budget {
                let msg = format!(
                    "estimated cost {:.2} {} exceeds budget {:.2}",
                    total,
                    state.currency(),
                    budget
                );
                state.raise(ComplianceFlag::new(Severity::Warning, msg, StageName::Compliance));
            }
        }

        if !state.findings().iter().any(|f| f.mentions("visa")) {
            let msg = format!("no visa information found for {}", state.request().country);
            state.raise(ComplianceFlag::new(Severity::Warning, msg, StageName::Compliance));
        }

        if let Some(snippet) = restriction(state) {
            state.raise(ComplianceFlag::new(
                Severity::Blocking,
                format!("entry restricted: {}", snippet),
                StageName::Compliance,
            ));
            if state.stage_has_retried(StageName::Compliance) {
                tracing::warn!(run_id = %state.run_id(), "restriction persists after corrective pass");
                return RoutingSignal::abort("compliance blocked");
            }
            tracing::warn!(run_id = %state.run_id(), "blocking restriction, asking logistics for a safer draft");
            return RoutingSignal::Retry(StageName::Logistics);
        }

        RoutingSignal::Continue(StageName::Experience)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Activity, Citation, DayDraft, Finding, FindingKind, PlanRequest, StageOutcome, StageRecord};
    use crate::retrieval::NoopRetriever;
    use crate::stages::test_support::context;
    use std::sync::Arc;

    fn note(state: &mut PlanningState, text: &str, source: &str) {
        state.append_finding(Finding {
            snippet: text.to_string(),
            citation: Citation::new(source, StageName::Researcher),
            score: 1.0,
            kind: FindingKind::Note,
        });
    }

    fn activity(name: &str, citation: Option<&str>) -> Activity {
        Activity {
            start_minute: 540,
            name: name.to_string(),
            location: "Barcelona".to_string(),
            duration_minutes: 60,
            estimated_cost: 0.0,
            citation: citation.map(str::to_string),
            category: None,
            coordinates: None,
            travel_minutes: 0,
            description: None,
            media: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_budget_and_visa_are_warnings_only() {
        let ctx = context(Arc::new(NoopRetriever));
        let mut s = PlanningState::new("r", PlanRequest::new("Barcelona", "Spain", 1).with_budget(10.0), "EUR");
        s.cost_breakdown.set("admission", 40.0);
        let mut day = DayDraft::empty(1);
        day.activities.push(activity("Walk", None));
        s.draft_itinerary = vec![day];

        assert_eq!(
            ComplianceStage.run(&mut s, &ctx).await,
            RoutingSignal::Continue(StageName::Experience)
        );
        let warnings: Vec<_> = s.flags().iter().filter(|f| f.severity == Severity::Warning).collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|f| f.message.contains("no visa information found for Spain")));
    }

    #[tokio::test]
    async fn test_destination_restriction_retries_once_then_aborts() {
        let ctx = context(Arc::new(NoopRetriever));
        let mut s = PlanningState::new("r", PlanRequest::new("Tokyo", "Japan", 1), "EUR");
        note(&mut s, "Entry restricted for tourists this season; visa on arrival suspended", "advisory");

        assert_eq!(
            ComplianceStage.run(&mut s, &ctx).await,
            RoutingSignal::Retry(StageName::Logistics)
        );
        assert!(s.has_flag(Severity::Blocking));

        s.record(StageRecord {
            stage: StageName::Compliance.as_str().to_string(),
            outcome: StageOutcome::Retry {
                stage: StageName::Logistics,
            },
            at: chrono::Utc::now(),
            retry_count: 0,
            flags: Vec::new(),
            detail: None,
        });
        assert_eq!(
            ComplianceStage.run(&mut s, &ctx).await,
            RoutingSignal::abort("compliance blocked")
        );
    }

    #[tokio::test]
    async fn test_unscheduled_restricted_place_does_not_block() {
        let ctx = context(Arc::new(NoopRetriever));
        let mut s = PlanningState::new("r", PlanRequest::new("Barcelona", "Spain", 1), "EUR");
        s.append_finding(Finding {
            snippet: "Military zone, entry restricted".to_string(),
            citation: Citation::new("zone", StageName::Researcher),
            score: 0.5,
            kind: FindingKind::PointOfInterest(crate::core::PointOfInterest {
                name: "Zone".to_string(),
                location: "Barcelona".to_string(),
                coordinates: None,
                duration_minutes: None,
                cost: 0.0,
                currency: None,
                category: None,
                opens: None,
                closes: None,
                media: None,
            }),
        });
        let mut day = DayDraft::empty(1);
        day.activities.push(activity("Beach", Some("beach-guide")));
        s.draft_itinerary = vec![day];
        assert_eq!(
            ComplianceStage.run(&mut s, &ctx).await,
            RoutingSignal::Continue(StageName::Experience)
        );

        s.draft_itinerary[0].activities.push(activity("Zone", Some("zone")));
        assert_eq!(
            ComplianceStage.run(&mut s, &ctx).await,
            RoutingSignal::Retry(StageName::Logistics)
        );
    }
}
