//! Logistics：把研究结果排成逐日、带时间段的草稿行程
//!
//! 贪心 + 时间窗：每天从 day_start 开始，反复挑选「放得进剩余时间、且满足开放时间」的候选，
//! 取移动时间最短者；同分按检索置信度、再按输入顺序。每天最多安排 ceil(候选数 / 天数) 个，
//! 避免前几天塞满、后几天空着。写入 draft_itinerary 与 admission / transport 两类费用。
//! 只有所有天都排不进任何活动时才 ABORT("insufficient data")。

use async_trait::async_trait;

use crate::config::LogisticsSection;
use crate::core::{
    parse_clock, round_cents, Activity, DayDraft, GeoPoint, PlanRequest, PlanningState, RoutingSignal,
    Severity, StageName,
};
use crate::stages::{capitalize, Stage, StageContext, RESTRICTED_MARKER};
use crate::tools::{estimate_leg, Leg, RouteProfile, TravelMode, CURRENCY_TOOL, MAPS_TOOL};

pub struct LogisticsStage;

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    location: String,
    coordinates: Option<GeoPoint>,
    duration: u32,
    /// 已换算为报价币种
    cost: f64,
    category: Option<String>,
    opens: Option<u32>,
    closes: Option<u32>,
    citation: Option<String>,
    score: f32,
    order: usize,
}

/// 把某个候选排在 clock 之后的结果
struct Placement {
    leg: Leg,
    start: u32,
}

/// 给定路段时候选能否排进 [clock, day_end]，并满足开放时间
fn fit(leg: Leg, c: &Candidate, clock: u32, day_end: u32) -> Option<Placement> {
    let arrive = clock.saturating_add(leg.minutes);
    let start = arrive.max(c.opens.unwrap_or(0));
    let finish = start.saturating_add(c.duration);
    if finish > day_end || c.closes.is_some_and(|closes| finish > closes) {
        return None;
    }
    Some(Placement { leg, start })
}

fn place(prev: Option<Option<GeoPoint>>, c: &Candidate, clock: u32, day_end: u32, profile: &RouteProfile) -> Option<Placement> {
    fit(estimate_leg(prev, c.coordinates, profile), c, clock, day_end)
}

/// 检索结果不足时，按偏好补充的通用活动（无来源、置信度为 0）
fn generic_candidates(req: &PlanRequest, needed: usize, minutes: u32, first_order: usize) -> Vec<Candidate> {
    let mut themes: Vec<&str> = req
        .enabled_preferences()
        .into_iter()
        .filter(|p| *p != "free_days")
        .collect();
    if themes.is_empty() {
        themes.push("sightseeing");
    }
    (0..needed)
        .map(|i| {
            let theme = themes[i % themes.len()];
            let round = i / themes.len() + 1;
            let mut name = format!("{} highlights of {}", capitalize(theme), req.city);
            if round > 1 {
                name.push_str(&format!(" (part {})", round));
            }
            Candidate {
                name,
                location: req.city.clone(),
                coordinates: None,
                duration: minutes,
                cost: 0.0,
                category: Some(theme.to_string()),
                opens: None,
                closes: None,
                citation: None,
                score: 0.0,
                order: first_order + i,
            }
        })
        .collect()
}

impl LogisticsStage {
    /// 外币费用经 currency_convert 换算；失败时保留原金额
    async fn convert(&self, amount: f64, from: &str, to: &str, ctx: &StageContext, run_id: &str) -> f64 {
        if amount == 0.0 || from.eq_ignore_ascii_case(to) {
            return amount;
        }
        let args = serde_json::json!({ "amount": amount, "from": from, "to": to });
        match ctx.tools.invoke_with_retry(CURRENCY_TOOL, args).await {
            Ok(v) => match v.get("amount").and_then(|a| a.as_f64()) {
                Some(converted) => converted,
                None => {
                    tracing::warn!(run_id = %run_id, "currency tool returned no amount, keeping {} {}", amount, from);
                    amount
                }
            },
            Err(e) => {
                tracing::warn!(run_id = %run_id, "currency conversion failed: {}, keeping {} {}", e, amount, from);
                amount
            }
        }
    }

    /// 已选路段经 maps_route 确认；缺坐标或工具失败时沿用本地估算
    async fn confirm_leg(&self, from: Option<Option<GeoPoint>>, to: Option<GeoPoint>, local: Leg, ctx: &StageContext) -> Leg {
        let (Some(Some(a)), Some(b)) = (from, to) else {
            return local;
        };
        let args = serde_json::json!({ "from": a, "to": b });
        match ctx.tools.invoke_with_retry(MAPS_TOOL, args).await {
            Ok(v) => serde_json::from_value(v).unwrap_or(local),
            Err(e) => {
                tracing::debug!("maps_route unavailable, using local estimate: {}", e);
                local
            }
        }
    }

    async fn candidates(&self, state: &PlanningState, ctx: &StageContext) -> Vec<Candidate> {
        let req = state.request();
        let cfg: &LogisticsSection = &ctx.config.logistics;
        let corrective = state.has_flag(Severity::Blocking);
        let per_slot_cap = req
            .budget
            .filter(|_| corrective)
            .map(|b| b / (req.days.max(1) as f64 * 3.0));

        let mut out = Vec::new();
        for (order, finding) in state.findings().iter().enumerate() {
            let Some(poi) = finding.point_of_interest() else {
                continue;
            };
            if corrective && finding.mentions(RESTRICTED_MARKER) {
                continue;
            }
            let from = poi.currency.as_deref().unwrap_or(state.currency());
            let cost = self.convert(poi.cost, from, state.currency(), ctx, state.run_id()).await;
            if per_slot_cap.is_some_and(|cap| cost > cap) {
                tracing::info!(run_id = %state.run_id(), poi = %poi.name, cost, "skipped on corrective pass");
                continue;
            }
            out.push(Candidate {
                name: poi.name.clone(),
                location: poi.location.clone(),
                coordinates: poi.coordinates,
                duration: poi
                    .duration_minutes
                    .unwrap_or(cfg.default_activity_minutes)
                    .min(cfg.day_minutes),
                cost,
                category: poi.category.clone(),
                opens: poi.opens,
                closes: poi.closes,
                citation: Some(finding.citation.source.clone()),
                score: finding.score,
                order,
            });
        }

        let wanted = req.days as usize * 2;
        if cfg.generic_activities && out.len() < wanted {
            let first_order = state.findings().len();
            out.extend(generic_candidates(
                req,
                wanted - out.len(),
                cfg.default_activity_minutes,
                first_order,
            ));
        }
        out
    }
}

#[async_trait]
impl Stage for LogisticsStage {
    fn name(&self) -> StageName {
        StageName::Logistics
    }

    async fn run(&self, state: &mut PlanningState, ctx: &StageContext) -> RoutingSignal {
        let cfg = &ctx.config.logistics;
        let profile = RouteProfile::from(cfg);
        let day_start = parse_clock(&cfg.day_start).unwrap_or(9 * 60);
        let day_end = day_start + cfg.day_minutes;
        let days = state.request().days;

        let mut pool = self.candidates(state, ctx).await;
        let per_day = pool.len().div_ceil(days.max(1) as usize).max(1);

        let mut drafts = Vec::with_capacity(days as usize);
        let mut transport = 0.0;
        let mut admission = 0.0;
        for day in 1..=days {
            let mut draft = DayDraft::empty(day);
            let mut clock = day_start;
            let mut prev: Option<Option<GeoPoint>> = None;
            // 确认路段后放不下的候选，当天不再考虑
            let mut deferred = Vec::new();

            while draft.activities.len() < per_day {
                // (移动分钟, -置信度, 输入顺序) 最小者
                let best = pool
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| place(prev, c, clock, day_end, &profile).map(|p| (i, p)))
                    .min_by(|(ia, a), (ib, b)| {
                        a.leg
                            .minutes
                            .cmp(&b.leg.minutes)
                            .then(pool[*ib].score.total_cmp(&pool[*ia].score))
                            .then(pool[*ia].order.cmp(&pool[*ib].order))
                    });
                let Some((idx, placement)) = best else {
                    break;
                };
                let c = pool.remove(idx);
                let leg = self.confirm_leg(prev, c.coordinates, placement.leg, ctx).await;
                let Some(placement) = fit(leg, &c, clock, day_end) else {
                    tracing::debug!(run_id = %state.run_id(), day, name = %c.name, "confirmed leg too long, deferring");
                    deferred.push(c);
                    continue;
                };
                match leg.mode {
                    TravelMode::Walk => draft.walking_km += leg.distance_km,
                    TravelMode::Transit => transport += cfg.transit_fare,
                    TravelMode::None | TravelMode::Unknown => {}
                }
                let start = placement.start;
                admission += c.cost;
                draft.activities.push(Activity {
                    start_minute: start,
                    name: c.name,
                    location: c.location,
                    duration_minutes: c.duration,
                    estimated_cost: round_cents(c.cost),
                    citation: c.citation,
                    category: c.category,
                    coordinates: c.coordinates,
                    travel_minutes: leg.minutes,
                    description: None,
                    media: Vec::new(),
                });
                clock = start + c.duration;
                prev = Some(c.coordinates);
            }
            pool.extend(deferred);
            draft.walking_km = (draft.walking_km * 10.0).round() / 10.0;
            drafts.push(draft);
        }

        if drafts.iter().all(|d| d.activities.is_empty()) {
            tracing::warn!(run_id = %state.run_id(), "no activity could be placed on any day");
            return RoutingSignal::abort("insufficient data");
        }

        let placed: usize = drafts.iter().map(|d| d.activities.len()).sum();
        tracing::info!(run_id = %state.run_id(), days, placed, unplaced = pool.len(), "draft itinerary built");
        state.draft_itinerary = drafts;
        state.cost_breakdown.set("admission", round_cents(admission));
        state.cost_breakdown.set("transport", round_cents(transport));
        RoutingSignal::Continue(StageName::Compliance)
    }
}
