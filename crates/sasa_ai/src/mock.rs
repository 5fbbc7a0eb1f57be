//! Mock providers — deterministic, call-counting stand-ins for testing the
//! dispatch and memory paths without API keys.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::llm::{ChatMessage, ImageEditProvider, Reply, TextProvider, VisionProvider};

/// Text provider returning a canned reply and recording every prompt.
#[derive(Debug, Default)]
pub struct MockText {
    pub reply: Mutex<String>,
    pub calls: AtomicUsize,
    pub last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockText {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Mutex::new(reply.to_string()),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextProvider for MockText {
    async fn ask(&self, question: &str) -> Reply {
        self.ask_with_messages(&[ChatMessage::user(question)]).await
    }

    async fn ask_with_messages(&self, messages: &[ChatMessage]) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        Reply::ok(self.reply.lock().unwrap().clone())
    }
}

/// Vision provider echoing the image URL it was shown.
#[derive(Debug, Default)]
pub struct MockVision {
    pub calls: AtomicUsize,
    pub last_url: Mutex<Option<String>>,
}

#[async_trait]
impl VisionProvider for MockVision {
    async fn ask(&self, image_url: &str, _prompt: Option<&str>) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap() = Some(image_url.to_string());
        Reply::ok(format!("(mock vision) {}", image_url))
    }
}

/// Image-edit provider echoing url and instruction.
#[derive(Debug, Default)]
pub struct MockImageEdit {
    pub calls: AtomicUsize,
    pub last_instruction: Mutex<Option<String>>,
}

#[async_trait]
impl ImageEditProvider for MockImageEdit {
    async fn edit(&self, image_url: &str, instruction: &str) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_instruction.lock().unwrap() = Some(instruction.to_string());
        Reply::ok(format!("[CQ:image,file={}#edited]", image_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_text_records_messages() {
        let mock = MockText::replying("好的喵");
        let reply = mock.ask("你好").await;
        assert_eq!(reply.text, "好的喵");
        assert!(!reply.degraded);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.last_messages.lock().unwrap().len(), 1);
    }
}
