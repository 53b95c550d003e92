//! web_search 工具：调用配置的 JSON 搜索端点，补充景点营业时间与季节信息
//!
//! GET {endpoint}?q=...&count=N，响应形如 {"results": [{"title", "url", "snippet"}]}；
//! 返回统一的 [{snippet, source_citation, score, metadata}]，与检索工具结构一致。
//! 超时由 ToolExecutor 负责，这里的 reqwest 超时只是兜底。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::retrieval::RetrievedSnippet;
use crate::tools::Tool;

pub const SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

/// 搜索工具：endpoint 与可选 API Key 由配置决定
pub struct SearchTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
}

impl SearchTool {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs.max(1)))
            .user_agent(concat!("wayfarer/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            max_results,
        }
    }

    async fn fetch(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, String> {
        let count = count.to_string();
        let mut req = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("Invalid search response: {}", e))?;
        Ok(body.results)
    }
}

/// 将搜索结果转为检索片段；排名越靠前分数越高
fn to_snippets(hits: Vec<SearchHit>) -> Vec<RetrievedSnippet> {
    let n = hits.len().max(1) as f32;
    hits.into_iter()
        .filter(|h| !h.url.trim().is_empty())
        .enumerate()
        .map(|(i, h)| {
            let snippet = if h.snippet.trim().is_empty() {
                h.title.clone()
            } else {
                h.snippet
            };
            let mut metadata = std::collections::BTreeMap::new();
            if !h.title.is_empty() {
                metadata.insert("title".to_string(), h.title);
            }
            RetrievedSnippet {
                snippet,
                source_citation: h.url,
                score: 1.0 - i as f32 / n,
                metadata,
            }
        })
        .collect()
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the web for opening hours, seasonal notes and points of interest. Args: {\"query\": \"text\", \"count\": 5}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "count": {"type": "integer", "minimum": 1}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing 'query'".to_string())?;
        let count = args
            .get("count")
            .and_then(|v| v.as_u64())
            .map(|c| (c as usize).min(self.max_results))
            .unwrap_or(self.max_results);
        let hits = self.fetch(query, count).await?;
        serde_json::to_value(to_snippets(hits)).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snippets_ranks_and_skips_missing_urls() {
        let hits: SearchResponse = serde_json::from_str(
            r#"{"results":[
                {"title":"Picasso Museum hours","url":"https://a.example/picasso","snippet":"Open 10:00-19:00, closed Mondays"},
                {"title":"No link","url":"  "},
                {"title":"Beach season","url":"https://b.example/beach"}
            ]}"#,
        )
        .unwrap();
        let snippets = to_snippets(hits.results);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].snippet, "Open 10:00-19:00, closed Mondays");
        assert_eq!(snippets[1].snippet, "Beach season");
        assert!(snippets[0].score > snippets[1].score);
        assert_eq!(snippets[1].metadata["title"], "Beach season");
    }
}
