//! Precomputed per-event fields, extracted once so rule matchers stay cheap
//! and pure.

use sasa_onebot::cq;
use sasa_onebot::{OneBotEvent, RawEvent};

/// Echo prefix for quoted-message fetches.
pub const REPLY_ECHO_PREFIX: &str = "reply_check_";

/// One dispatchable event with everything the rules look at.
///
/// For API callbacks the user/group fields start empty; the callback rule
/// fills them in from the pending entry it pops.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub message_type: String,
    pub message_id: i64,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub self_id: i64,
    /// Raw message with CQ markup intact.
    pub raw_msg: String,
    /// User text with reply/at/image markup stripped.
    pub text: String,
    pub is_message_event: bool,
    pub is_reply_callback: bool,
    pub echo: Option<String>,
    pub is_mentioned: bool,
    pub img_url: Option<String>,
    pub reply_id: Option<String>,
}

impl EventContext {
    /// Build a context from a parsed frame. Meta/notice/request events and
    /// unrelated API responses yield `None` and are never dispatched.
    pub fn from_event(raw: &RawEvent) -> Option<EventContext> {
        match raw {
            RawEvent::Event(OneBotEvent::Message(m)) => {
                let mentioned =
                    m.message_type == "private" || cq::contains_at(&m.raw_message, m.self_id);
                Some(EventContext {
                    message_type: m.message_type.clone(),
                    message_id: m.message_id,
                    user_id: m.user_id,
                    group_id: m.group_id,
                    self_id: m.self_id,
                    raw_msg: m.raw_message.clone(),
                    text: cq::normalize_user_text(&m.raw_message),
                    is_message_event: true,
                    is_reply_callback: false,
                    echo: None,
                    is_mentioned: mentioned,
                    img_url: cq::extract_image_url(&m.raw_message),
                    reply_id: cq::extract_reply_id(&m.raw_message),
                })
            }
            RawEvent::Api(resp) => {
                let echo = resp.echo.as_deref()?;
                if !echo.starts_with(REPLY_ECHO_PREFIX) {
                    return None;
                }
                let fetched = if resp.is_ok() { resp.raw_message() } else { String::new() };
                Some(EventContext {
                    raw_msg: fetched,
                    is_reply_callback: true,
                    echo: Some(echo.to_string()),
                    ..Default::default()
                })
            }
            _ => None,
        }
    }

    /// Bucket key for per-conversation config: the group id, or "private".
    pub fn conversation_key(&self) -> String {
        match self.group_id {
            Some(id) => id.to_string(),
            None => "private".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> EventContext {
        EventContext::from_event(&RawEvent::parse(json).unwrap()).unwrap()
    }

    #[test]
    fn test_group_mention_with_image() {
        let ctx = parse(
            r#"{
                "post_type": "message", "message_type": "group",
                "message_id": 7, "user_id": 1, "group_id": 2, "self_id": 99,
                "raw_message": "[CQ:at,qq=99] 看这个 [CQ:image,file=a.jpg,url=http://x/a.jpg]",
                "sender": null, "time": 0
            }"#,
        );
        assert!(ctx.is_message_event);
        assert!(ctx.is_mentioned);
        assert_eq!(ctx.img_url.as_deref(), Some("http://x/a.jpg"));
        assert_eq!(ctx.text, "看这个");
        assert_eq!(ctx.conversation_key(), "2");
    }

    #[test]
    fn test_group_message_without_at_is_not_mentioned() {
        let ctx = parse(
            r#"{
                "post_type": "message", "message_type": "group",
                "message_id": 7, "user_id": 1, "group_id": 2, "self_id": 99,
                "raw_message": "[CQ:at,qq=12345] 你好",
                "sender": null, "time": 0
            }"#,
        );
        assert!(!ctx.is_mentioned);
    }

    #[test]
    fn test_private_message_counts_as_mentioned() {
        let ctx = parse(
            r#"{
                "post_type": "message", "message_type": "private",
                "message_id": 7, "user_id": 1, "group_id": null, "self_id": 99,
                "raw_message": "在吗",
                "sender": null, "time": 0
            }"#,
        );
        assert!(ctx.is_mentioned);
        assert_eq!(ctx.conversation_key(), "private");
    }

    #[test]
    fn test_reply_callback_context() {
        let ctx = parse(
            r#"{
                "status": "ok", "retcode": 0,
                "data": {"raw_message": "原消息内容"},
                "echo": "reply_check_42"
            }"#,
        );
        assert!(ctx.is_reply_callback);
        assert!(!ctx.is_message_event);
        assert_eq!(ctx.raw_msg, "原消息内容");
        assert_eq!(ctx.echo.as_deref(), Some("reply_check_42"));
    }

    #[test]
    fn test_unrelated_frames_yield_none() {
        let meta = RawEvent::parse(r#"{"post_type": "meta_event", "meta_event_type": "heartbeat"}"#)
            .unwrap();
        assert!(EventContext::from_event(&meta).is_none());

        let foreign_echo =
            RawEvent::parse(r#"{"status": "ok", "retcode": 0, "data": null, "echo": "other_7"}"#)
                .unwrap();
        assert!(EventContext::from_event(&foreign_echo).is_none());
    }
}
