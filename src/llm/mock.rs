//! Mock LLM 客户端（离线运行与测试用，无需 API）
//!
//! 取最后一条 User 消息生成一句确定性的文案；流式接口按词切片，便于测试中途丢弃。

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, Message, Role, TextStream};

/// Mock 客户端：把最后一条用户消息改写成一句推荐语
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.trim())
            .unwrap_or("(no input)");

        Ok(format!("Take your time with {}.", last_user.trim_end_matches('.')))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, String> {
        let content = self.complete(messages).await?;
        let fragments: Vec<Result<String, String>> = content
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }
}
