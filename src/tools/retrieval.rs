//! retrieval_query 工具：把检索协作方包装成统一的工具调用
//!
//! Args: {"query": "...", "user_scope": "...", "top_k": 8}，返回 RetrievedSnippet 数组。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::retrieval::Retriever;
use crate::tools::Tool;

pub const RETRIEVAL_TOOL: &str = "retrieval_query";

pub struct RetrievalTool {
    retriever: Arc<dyn Retriever>,
    default_top_k: usize,
}

impl RetrievalTool {
    pub fn new(retriever: Arc<dyn Retriever>, default_top_k: usize) -> Self {
        Self {
            retriever,
            default_top_k,
        }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        RETRIEVAL_TOOL
    }

    fn description(&self) -> &str {
        "Query the user's indexed travel documents. Args: {\"query\": \"text\", \"user_scope\": \"user id\", \"top_k\": 8}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "user_scope": {"type": "string"},
                "top_k": {"type": "integer", "minimum": 1}
            },
            "required": ["query", "user_scope"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing 'query'".to_string())?;
        let scope = args
            .get("user_scope")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing 'user_scope'".to_string())?;
        let top_k = args
            .get("top_k")
            .and_then(|v| v.as_u64())
            .map(|k| k as usize)
            .unwrap_or(self.default_top_k);

        let hits = self.retriever.query(query, scope, top_k).await?;
        serde_json::to_value(hits).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::InMemoryRetriever;

    #[tokio::test]
    async fn test_retrieval_tool_round_trip_and_missing_args() {
        let r = InMemoryRetriever::new();
        r.add_public("Park Guell mosaics", "guide-1");
        let tool = RetrievalTool::new(Arc::new(r), 4);

        let out = tool
            .execute(serde_json::json!({"query": "park guell", "user_scope": "u1"}))
            .await
            .unwrap();
        assert_eq!(out.as_array().map(|a| a.len()), Some(1));
        assert_eq!(out[0]["source_citation"], "guide-1");

        assert!(tool.execute(serde_json::json!({"query": "x"})).await.is_err());
    }
}
