//! Provider capability traits and the degraded-reply contract.
//!
//! Every provider call that feeds a user-visible reply returns a `Reply`
//! instead of a `Result`: on any failure the reply text is a fixed in-persona
//! fallback and `degraded` is set. Callers never see raw errors. The one
//! exception is the emotion classifier (`sasa_core::EmotionClassifier`),
//! whose caller explicitly handles degradation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fixed fallback strings, kept in persona.
pub const FALLBACK_TEXT: &str = "脑子瓦特了...";
pub const FALLBACK_VISION: &str = "图片加载失败了捏...";
pub const FALLBACK_EDIT: &str = "修图失败了捏...";
pub const BUSY_TEXT: &str = "我现在有点忙不过来，稍后再来找我吧~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A provider reply that is always usable as-is.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub degraded: bool,
}

impl Reply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), degraded: false }
    }
    pub fn degraded(text: impl Into<String>) -> Self {
        Self { text: text.into(), degraded: true }
    }
}

#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn ask(&self, question: &str) -> Reply;
    async fn ask_with_messages(&self, messages: &[ChatMessage]) -> Reply;
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Describe or comment on an image. `prompt` overrides the configured
    /// vision persona prompt when given.
    async fn ask(&self, image_url: &str, prompt: Option<&str>) -> Reply;
}

#[async_trait]
pub trait ImageEditProvider: Send + Sync {
    /// Edit an image per the instruction. Success returns `[CQ:image,...]`
    /// markup ready to send.
    async fn edit(&self, image_url: &str, instruction: &str) -> Reply;
}

/// Strip a surrounding markdown code fence, if present. Models asked for
/// bare JSON frequently wrap it anyway.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert!(json.contains("\"role\":\"system\""));
    }

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }
}
