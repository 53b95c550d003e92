//! 对账：DONE 之后运行一次，把各阶段输出合成为对外响应
//!
//! - citations 按来源身份去重，保留最早出现的条目
//! - 费用总额一律由类别求和重新计算，阶段上报的累计值只用于发现漂移
//! - 多次运行结果相同

use crate::core::{format_clock, round_cents, DayDraft, PlanningState, RunStatus};
use crate::output::{format_duration, CostSummary, DayPlan, ItineraryResponse, PlannedActivity, Tour};

fn day_plan(d: &DayDraft) -> DayPlan {
    DayPlan {
        day: d.day,
        theme: d.theme.clone().unwrap_or_else(|| format!("Day {}", d.day)),
        plan: d
            .activities
            .iter()
            .map(|a| PlannedActivity {
                time: format_clock(a.start_minute),
                activity: a.name.clone(),
                location: a.location.clone(),
                duration: format_duration(a.duration_minutes),
                duration_minutes: a.duration_minutes,
                description: a.description.clone().unwrap_or_else(|| a.name.clone()),
                media: a.media.clone(),
                estimated_cost: a.estimated_cost,
                citation: a.citation.clone(),
            })
            .collect(),
        estimated_walking: format!("{:.1} km", d.walking_km),
        walking_km: d.walking_km,
        tips: d.tips.clone().unwrap_or_default(),
        meals: d.meals.clone().unwrap_or_default(),
    }
}

/// 生成最终响应并将状态置为 COMPLETED
pub fn reconcile(state: &mut PlanningState) -> ItineraryResponse {
    state.dedupe_citations();

    let total = state.cost_breakdown.recomputed_total();
    if (round_cents(state.cost_breakdown.reported_total) - total).abs() >= 0.01 {
        tracing::warn!(
            run_id = %state.run_id(),
            reported = state.cost_breakdown.reported_total,
            total,
            "stage-reported total drifted from category sum, using category sum"
        );
    }
    state.cost_breakdown.reported_total = total;

    let req = state.request();
    let budget = req.budget;
    let tour = Tour {
        title: format!("{}-Day {} Itinerary", req.days, req.city),
        description: state
            .tour_summary
            .clone()
            .unwrap_or_else(|| format!("{} days in {}, {}.", req.days, req.city, req.country)),
        city: req.city.clone(),
        country: req.country.clone(),
        days: req.days,
        daily_plans: state.draft_itinerary.iter().map(day_plan).collect(),
        notices: state.flags().to_vec(),
    };
    let cost = CostSummary {
        currency: state.currency().to_string(),
        categories: state
            .cost_breakdown
            .categories
            .iter()
            .map(|(k, v)| (k.clone(), round_cents(*v)))
            .collect(),
        total,
        budget,
        within_budget: budget.map_or(true, |b| total <= b),
    };
    let citations = state.citations().iter().map(|c| c.source.clone()).collect();

    state.set_status(RunStatus::Completed);
    ItineraryResponse {
        run_id: state.run_id().to_string(),
        tour,
        cost,
        citations,
        status: RunStatus::Completed,
    }
}
