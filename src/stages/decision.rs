//! Decision：对账前的最终一致性检查，总是交给对账
//!
//! 空白日（请求未允许 free_days）与超出预算容差只记 WARNING；Compliance 已经记过超预算时不再重复。

use async_trait::async_trait;

use crate::core::{ComplianceFlag, PlanningState, RoutingSignal, Severity, StageName};
use crate::stages::{Stage, StageContext};

pub struct DecisionStage;

#[async_trait]
impl Stage for DecisionStage {
    fn name(&self) -> StageName {
        StageName::Decision
    }

    async fn run(&self, state: &mut PlanningState, ctx: &StageContext) -> RoutingSignal {
        if !state.request().allows_free_days() {
            let empty: Vec<u32> = state
                .draft_itinerary
                .iter()
                .filter(|d| d.activities.is_empty())
                .map(|d| d.day)
                .collect();
            for day in empty {
                state.raise(ComplianceFlag::new(
                    Severity::Warning,
                    format!("day {} has no planned activities", day),
                    StageName::Decision,
                ));
            }
        }

        if let Some(budget) = state.request().budget {
            let tolerance = ctx.config.decision.budget_tolerance.max(0.0);
            let total = state.cost_breakdown.recomputed_total();
            let already_warned = state
                .flags()
                .iter()
                .any(|f| f.severity == Severity::Warning && f.message.contains("exceeds budget"));
            if total > budget * (1.0 + tolerance) && !already_warned {
                state.raise(ComplianceFlag::new(
                    Severity::Warning,
                    format!(
                        "total {:.2} {} is beyond budget tolerance ({:.0}%)",
                        total,
                        state.currency(),
                        tolerance * 100.0
                    ),
                    StageName::Decision,
                ));
            }
        }

        RoutingSignal::Done
    }
}
