//! OpenAI 兼容端点上的文案生成
//!
//! Experience 阶段的活动描述与 CLI 的行程叙述都经过这里；narrate 使用真正的流式接口，
//! 片段按到达顺序交给调用方。

use std::sync::atomic::{AtomicU64, Ordering};

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::LlmSection;
use crate::llm::{LlmClient, Message, Role, TextStream};

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature: 0.7,
            max_tokens: 400,
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
        }
    }

    /// 按 [llm] 段构建；api_key 由调用方从环境变量取得
    pub fn from_config(cfg: &LlmSection, api_key: &str) -> Self {
        let mut client = Self::new(cfg.base_url.as_deref(), &cfg.model, api_key);
        client.temperature = cfg.temperature;
        client.max_tokens = cfg.max_tokens;
        client
    }

    fn request(&self, messages: &[Message], stream: bool) -> Result<CreateChatCompletionRequest, String> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens)
            .stream(stream)
            .messages(messages)
            .build()
            .map_err(|e| e.to_string())
    }
}

fn to_request_message(m: &Message) -> Result<ChatCompletionRequestMessage, String> {
    let built = match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(m.content.clone())
            .build()
            .map(ChatCompletionRequestMessage::System),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(m.content.clone())
            .build()
            .map(ChatCompletionRequestMessage::User),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(m.content.clone())
            .build()
            .map(ChatCompletionRequestMessage::Assistant),
    };
    built.map_err(|e| e.to_string())
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let request = self.request(messages, false)?;
        let response = self.client.chat().create(request).await.map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            self.prompt_tokens.fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
            self.completion_tokens
                .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
            tracing::debug!(
                model = %self.model,
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                "llm usage"
            );
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<TextStream, String> {
        let request = self.request(messages, true)?;
        let upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| e.to_string())?;

        // 只转发非空的 delta 文本
        let fragments = upstream.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|s| !s.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(e.to_string())),
            }
        });
        Ok(Box::pin(fragments))
    }
}
