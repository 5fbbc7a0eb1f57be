//! Aliyun DashScope image-edit client (qwen-image-edit).
//!
//! Success returns `[CQ:image,file=<url>]` markup ready to send back over
//! the chat transport.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::llm::{ImageEditProvider, Reply, BUSY_TEXT, FALLBACK_EDIT};
use crate::retry::{with_retry, RetryConfig};

const DASHSCOPE_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation";
const EDIT_MODEL: &str = "qwen-image-edit-plus";

pub struct AliyunImageEdit {
    client: Client,
    api_key: String,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl AliyunImageEdit {
    pub fn new(
        api_key: &str,
        timeout: Duration,
        retry: RetryConfig,
        breaker: CircuitBreaker,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.to_string(),
            retry,
            breaker,
        })
    }
}

/// Pull the first output image URL out of a DashScope multimodal response.
fn extract_image(data: &serde_json::Value) -> Option<&str> {
    data["output"]["choices"][0]["message"]["content"]
        .as_array()?
        .iter()
        .find_map(|item| item.get("image").and_then(|v| v.as_str()))
}

#[async_trait]
impl ImageEditProvider for AliyunImageEdit {
    async fn edit(&self, image_url: &str, instruction: &str) -> Reply {
        if self.api_key.is_empty() {
            return Reply::degraded("未配置 ALIYUN_API_KEY");
        }
        if !self.breaker.try_acquire() {
            return Reply::degraded(BUSY_TEXT);
        }

        let body = json!({
            "model": EDIT_MODEL,
            "input": {
                "messages": [{
                    "role": "user",
                    "content": [
                        {"image": image_url},
                        {"text": instruction},
                    ],
                }],
            },
        });

        let result = with_retry(&self.retry, "aliyun", || {
            let request = self
                .client
                .post(DASHSCOPE_URL)
                .bearer_auth(&self.api_key)
                .json(&body);
            async move { Ok(request.send().await?) }
        })
        .await;

        match result {
            Ok(response) => {
                let parsed: anyhow::Result<serde_json::Value> =
                    async { Ok(response.json().await?) }.await;
                match parsed {
                    Ok(data) => match extract_image(&data) {
                        Some(url) => {
                            self.breaker.on_success();
                            Reply::ok(format!("[CQ:image,file={}]", url))
                        }
                        None => {
                            tracing::warn!("aliyun response had no image output");
                            self.breaker.on_failure();
                            Reply::degraded("修图成功，但没拿到返回的图片链接...")
                        }
                    },
                    Err(e) => {
                        tracing::warn!("aliyun malformed response: {}", e);
                        self.breaker.on_failure();
                        Reply::degraded(FALLBACK_EDIT)
                    }
                }
            }
            Err(e) => {
                tracing::warn!("aliyun call failed: {}", e);
                self.breaker.on_failure();
                Reply::degraded(FALLBACK_EDIT)
            }
        }
    }
}
