//! Zhipu GLM vision client: short image commentary in persona.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::llm::{Reply, VisionProvider, BUSY_TEXT, FALLBACK_VISION};
use crate::retry::{with_retry, RetryConfig};

const ZHIPU_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
const ZHIPU_MODEL: &str = "glm-4.6v";

pub struct ZhipuVision {
    client: Client,
    api_key: String,
    system_prompt: String,
    vision_prompt: String,
    temperature: f32,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl ZhipuVision {
    pub fn new(
        api_key: &str,
        system_prompt: &str,
        vision_prompt: &str,
        temperature: f32,
        timeout: Duration,
        retry: RetryConfig,
        breaker: CircuitBreaker,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.to_string(),
            system_prompt: system_prompt.to_string(),
            vision_prompt: vision_prompt.to_string(),
            temperature,
            retry,
            breaker,
        })
    }
}

#[async_trait]
impl VisionProvider for ZhipuVision {
    async fn ask(&self, image_url: &str, prompt: Option<&str>) -> Reply {
        if self.api_key.is_empty() {
            return Reply::degraded("未配置 ZHIPU_API_KEY");
        }
        if !self.breaker.try_acquire() {
            return Reply::degraded(BUSY_TEXT);
        }

        let final_prompt = match prompt {
            Some(p) => p.to_string(),
            None => format!(
                "{},{} 请评价一下这张图片，简短一点，不要超过100个字。",
                self.system_prompt, self.vision_prompt
            ),
        };

        let body = json!({
            "model": ZHIPU_MODEL,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": final_prompt},
                    {"type": "image_url", "image_url": {"url": image_url}},
                ],
            }],
            "temperature": self.temperature,
        });

        let result = with_retry(&self.retry, "zhipu", || {
            let request = self
                .client
                .post(ZHIPU_URL)
                .bearer_auth(&self.api_key)
                .json(&body);
            async move { Ok(request.send().await?) }
        })
        .await;

        match result {
            Ok(response) => {
                let parsed: anyhow::Result<String> = async {
                    let data: serde_json::Value = response.json().await?;
                    data["choices"][0]["message"]["content"]
                        .as_str()
                        .map(|s| s.trim().to_string())
                        .ok_or_else(|| anyhow::anyhow!("missing content"))
                }
                .await;
                match parsed {
                    Ok(text) => {
                        self.breaker.on_success();
                        Reply::ok(text)
                    }
                    Err(e) => {
                        tracing::warn!("zhipu malformed response: {}", e);
                        self.breaker.on_failure();
                        Reply::degraded(FALLBACK_VISION)
                    }
                }
            }
            Err(e) => {
                tracing::warn!("zhipu call failed: {}", e);
                self.breaker.on_failure();
                Reply::degraded(FALLBACK_VISION)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_degrades_without_io() {
        let vision = ZhipuVision::new(
            "",
            "人设",
            "看图风格",
            1.3,
            Duration::from_secs(5),
            RetryConfig::default(),
            CircuitBreaker::new(3, Duration::from_secs(60)),
        )
        .unwrap();
        let reply = vision.ask("http://example/a.jpg", None).await;
        assert!(reply.degraded);
    }
}
