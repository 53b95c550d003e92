//! 行程讲解：把最终响应交给 LLM 流式生成文字片段
//!
//! 只读取已完成的响应，消费方随时丢弃流都不会影响任何运行。

use crate::llm::{LlmClient, Message, TextStream};
use crate::output::ItineraryResponse;

fn outline(response: &ItineraryResponse) -> String {
    let mut out = format!("{}\n", response.tour.title);
    for day in &response.tour.daily_plans {
        let stops: Vec<String> = day
            .plan
            .iter()
            .map(|p| format!("{} {}", p.time, p.activity))
            .collect();
        out.push_str(&format!("Day {} ({}): {}\n", day.day, day.theme, stops.join("; ")));
    }
    out.push_str(&format!("Total: {:.2} {}", response.cost.total, response.cost.currency));
    out
}

/// 以流的形式讲解行程
pub async fn narrate(llm: &dyn LlmClient, response: &ItineraryResponse) -> Result<TextStream, String> {
    let messages = [
        Message::system("You are a friendly tour guide. Walk the traveller through the itinerary day by day."),
        Message::user(outline(response)),
    ];
    llm.complete_stream(&messages).await
}
