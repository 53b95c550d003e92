//! Experience：为活动补充文案、媒体与每日主题 / 提示 / 三餐建议
//!
//! 只做标注：不改时间段顺序，也不写费用。LLM 超时或失败时保留原始活动名，运行照常继续。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{DayDraft, FindingKind, MealPlan, PlanningState, RoutingSignal, StageName};
use crate::llm::{LlmClient, Message};
use crate::stages::{capitalize, Stage, StageContext};

const COPYWRITER_PROMPT: &str =
    "You are a travel copywriter. Answer with one or two vivid sentences, no lists, no prices.";

/// 与营业时间 / 季节相关的说明文字，用作每日提示
const TIP_KEYWORDS: [&str; 7] = ["hours", "open", "closed", "season", "summer", "winter", "crowd"];

pub struct ExperienceStage;

async fn generate(llm: &dyn LlmClient, prompt: String, limit: Duration) -> Option<String> {
    let messages = [Message::system(COPYWRITER_PROMPT), Message::user(prompt)];
    match tokio::time::timeout(limit, llm.complete(&messages)).await {
        Ok(Ok(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::warn!("copy generation failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("copy generation timed out after {}ms", limit.as_millis());
            None
        }
    }
}

/// 当天出现最多的类别作为主题
fn day_theme(day: &DayDraft, city: &str) -> String {
    if day.activities.is_empty() {
        return format!("Free day in {}", city);
    }
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for a in &day.activities {
        if let Some(c) = a.category.as_deref() {
            *counts.entry(c).or_insert(0) += 1;
        }
    }
    match counts.into_iter().max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0))) {
        Some((category, _)) => format!("{} in {}", capitalize(category), city),
        None => format!("Exploring {}", city),
    }
}

fn meals(day: &DayDraft, city: &str, foodie: bool) -> MealPlan {
    let near = |idx: Option<usize>| {
        idx.and_then(|i| day.activities.get(i))
            .map(|a| a.location.clone())
            .unwrap_or_else(|| city.to_string())
    };
    let n = day.activities.len();
    let dinner = if foodie {
        format!("Tasting menu of local specialities near {}", near(n.checked_sub(1)))
    } else {
        format!("Dinner near {}", near(n.checked_sub(1)))
    };
    MealPlan {
        breakfast: Some(format!("Café breakfast near {}", near(Some(0)))),
        lunch: Some(format!("Local lunch spot near {}", near(Some(n / 2)))),
        dinner: Some(dinner),
    }
}

#[async_trait]
impl Stage for ExperienceStage {
    fn name(&self) -> StageName {
        StageName::Experience
    }

    async fn run(&self, state: &mut PlanningState, ctx: &StageContext) -> RoutingSignal {
        let limit = Duration::from_millis(ctx.config.llm.timeout_ms.max(1));
        let city = state.request().city.clone();
        let foodie = state.request().prefers("food");

        // 来源 -> 媒体
        let media: BTreeMap<String, String> = state
            .findings()
            .iter()
            .filter_map(|f| match &f.kind {
                FindingKind::PointOfInterest(p) => p.media.clone().map(|m| (f.citation.source.clone(), m)),
                FindingKind::Note => None,
            })
            .collect();
        let tips: Vec<String> = state
            .findings()
            .iter()
            .filter(|f| f.point_of_interest().is_none())
            .filter(|f| TIP_KEYWORDS.iter().any(|k| f.mentions(k)))
            .map(|f| f.snippet.clone())
            .collect();

        let mut drafts = std::mem::take(&mut state.draft_itinerary);
        let mut enriched = 0usize;
        for day in drafts.iter_mut() {
            for activity in day.activities.iter_mut() {
                let prompt = format!("{} in {}, {}", activity.name, activity.location, city);
                if let Some(text) = generate(ctx.llm.as_ref(), prompt, limit).await {
                    activity.description = Some(text);
                    enriched += 1;
                }
                if let Some(m) = activity.citation.as_ref().and_then(|c| media.get(c)) {
                    if !activity.media.contains(m) {
                        activity.media.push(m.clone());
                    }
                }
            }
            day.theme = Some(day_theme(day, &city));
            day.tips = Some(if tips.is_empty() {
                "Book popular sights in advance and keep some time for wandering.".to_string()
            } else {
                tips[(day.day.max(1) as usize - 1) % tips.len()].clone()
            });
            day.meals = Some(meals(day, &city, foodie));
        }
        state.draft_itinerary = drafts;

        let req = state.request();
        let highlights: Vec<&str> = state
            .draft_itinerary
            .iter()
            .flat_map(|d| d.activities.iter().take(1))
            .map(|a| a.name.as_str())
            .collect();
        let overview = format!(
            "a {}-day trip to {}, {} featuring {}",
            req.days,
            req.city,
            req.country,
            highlights.join(", ")
        );
        let fallback = format!("{} days in {}, {}: {}.", req.days, req.city, req.country, highlights.join(", "));
        state.tour_summary = Some(generate(ctx.llm.as_ref(), overview, limit).await.unwrap_or(fallback));

        tracing::info!(run_id = %state.run_id(), enriched, "experience annotations added");
        RoutingSignal::Continue(StageName::Decision)
    }
}
