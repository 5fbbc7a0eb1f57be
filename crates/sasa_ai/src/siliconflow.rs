//! SiliconFlow emotion classifier.
//!
//! Unlike the reply-producing providers, this one surfaces failures as
//! errors: the `EmotionRecognizer` explicitly falls back to its rule result.

use async_trait::async_trait;
use reqwest::Client;
use sasa_core::emotion::{EmotionClassifier, EmotionLabel};
use serde_json::json;
use std::time::Duration;

use crate::llm::strip_code_fence;

const SILICONFLOW_URL: &str = "https://api.siliconflow.cn/v1/chat/completions";
const CLASSIFY_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";

const CLASSIFY_SYSTEM_PROMPT: &str = r#"你是一个情绪分析专家。请分析用户消息中的情绪。

你必须从以下8种情绪中选择一个最匹配的：
- neutral（中性/平静）
- happy（开心/愉快）
- sad（难过/悲伤）
- angry（生气/愤怒）
- fear（害怕/恐惧）
- disgust（厌恶/反感）
- surprise（惊讶/意外）
- calm（平和/安宁）

请用JSON格式返回，包含以下字段：
- label: 情绪标签（上面8个之一）
- intensity: 情绪强度（0.0-1.0的浮点数）
- reason: 简短的判断理由（不超过20字）

只返回JSON，不要有其他内容。

示例输出：
{"label": "happy", "intensity": 0.8, "reason": "使用了开心的表情和感叹词"}"#;

pub struct SiliconFlowClassifier {
    client: Client,
    api_key: String,
}

impl SiliconFlowClassifier {
    pub fn new(api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.to_string(),
        })
    }
}

/// Parse the model's JSON reply. Out-of-vocabulary labels coerce to neutral;
/// an unparseable body degrades to a low-confidence neutral rather than an
/// error, since the call itself succeeded.
fn parse_classification(content: &str) -> (EmotionLabel, f32, f32) {
    let cleaned = strip_code_fence(content);
    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(value) => {
            let label = value["label"]
                .as_str()
                .map(EmotionLabel::parse_lenient)
                .unwrap_or(EmotionLabel::Neutral);
            let intensity = value["intensity"].as_f64().unwrap_or(0.5) as f32;
            (label, intensity.clamp(0.0, 1.0), 0.8)
        }
        Err(e) => {
            tracing::warn!(
                "classifier returned non-JSON ({}): {}",
                e,
                content.chars().take(100).collect::<String>()
            );
            (EmotionLabel::Neutral, 0.5, 0.4)
        }
    }
}

#[async_trait]
impl EmotionClassifier for SiliconFlowClassifier {
    async fn classify(&self, text: &str) -> anyhow::Result<(EmotionLabel, f32, f32)> {
        if self.api_key.is_empty() {
            anyhow::bail!("SILICONFLOW_API_KEY not configured");
        }

        let body = json!({
            "model": CLASSIFY_MODEL,
            "messages": [
                {"role": "system", "content": CLASSIFY_SYSTEM_PROMPT},
                {"role": "user", "content": format!("请分析以下消息的情绪：\n\n{}", text)},
            ],
            "stream": false,
            "max_tokens": 100,
            "temperature": 0.3,
            "top_p": 0.9,
        });

        let response = self
            .client
            .post(SILICONFLOW_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let data: serde_json::Value = response.json().await?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing classifier content"))?;

        Ok(parse_classification(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let (label, intensity, confidence) =
            parse_classification(r#"{"label": "angry", "intensity": 0.9, "reason": "骂人了"}"#);
        assert_eq!(label, EmotionLabel::Angry);
        assert!((intensity - 0.9).abs() < 1e-6);
        assert!((confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"label\": \"sad\", \"intensity\": 0.4, \"reason\": \"低落\"}\n```";
        let (label, intensity, _) = parse_classification(content);
        assert_eq!(label, EmotionLabel::Sad);
        assert!((intensity - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_label_coerces_to_neutral() {
        let (label, _, _) =
            parse_classification(r#"{"label": "melancholy", "intensity": 0.5, "reason": "x"}"#);
        assert_eq!(label, EmotionLabel::Neutral);
    }

    #[test]
    fn test_intensity_clamped() {
        let (_, intensity, _) =
            parse_classification(r#"{"label": "happy", "intensity": 3.0, "reason": "x"}"#);
        assert!((intensity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_garbage_degrades_to_neutral() {
        let (label, intensity, confidence) = parse_classification("我觉得他很开心");
        assert_eq!(label, EmotionLabel::Neutral);
        assert!((intensity - 0.5).abs() < 1e-6);
        assert!((confidence - 0.4).abs() < 1e-6);
    }
}
