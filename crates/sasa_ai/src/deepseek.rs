//! DeepSeek text chat client (OpenAI-compatible chat completions).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::llm::{ChatMessage, Reply, TextProvider, BUSY_TEXT, FALLBACK_TEXT};
use crate::retry::{with_retry, RetryConfig};

pub struct DeepSeekText {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl DeepSeekText {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
        retry: RetryConfig,
        breaker: CircuitBreaker,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            temperature,
            max_tokens,
            retry,
            breaker,
        })
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Reply {
        if self.api_key.is_empty() {
            return Reply::degraded("未配置 DEEPSEEK_API_KEY");
        }
        if !self.breaker.try_acquire() {
            tracing::info!("deepseek circuit open, short-circuiting");
            return Reply::degraded(BUSY_TEXT);
        }

        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let result = with_retry(&self.retry, "deepseek", || {
            let request = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body);
            async move { Ok(request.send().await?) }
        })
        .await;

        match result {
            Ok(response) => match extract_content(response).await {
                Ok(text) => {
                    self.breaker.on_success();
                    Reply::ok(text)
                }
                Err(e) => {
                    tracing::warn!("deepseek malformed response: {}", e);
                    self.breaker.on_failure();
                    Reply::degraded(FALLBACK_TEXT)
                }
            },
            Err(e) => {
                tracing::warn!("deepseek call failed: {}", e);
                self.breaker.on_failure();
                Reply::degraded(FALLBACK_TEXT)
            }
        }
    }
}

async fn extract_content(response: reqwest::Response) -> anyhow::Result<String> {
    let data: serde_json::Value = response.json().await?;
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("missing choices[0].message.content"))
}

#[async_trait]
impl TextProvider for DeepSeekText {
    async fn ask(&self, question: &str) -> Reply {
        let messages = [
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(question),
        ];
        self.complete(&messages).await
    }

    async fn ask_with_messages(&self, messages: &[ChatMessage]) -> Reply {
        self.complete(messages).await
    }
}
