//! CQ-code extraction and stripping.
//!
//! OneBot raw messages embed markup like `[CQ:at,qq=123]`,
//! `[CQ:reply,id=456]` and `[CQ:image,...,url=http...]`. Matching and AI
//! calls want the markup pulled out or removed.

use regex::Regex;
use std::sync::LazyLock;

static RE_IMAGE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[CQ:image,.*?url=(http[^,\]]+)").unwrap());
static RE_AT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[CQ:at,qq=(\d+)\]").unwrap());
static RE_REPLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[CQ:reply,id=(\d+)\]").unwrap());
static RE_IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[CQ:image[^\]]*\]").unwrap());

/// Extract the first `CQ:image` URL, unescaping the `&amp;` the protocol
/// produces inside query strings.
pub fn extract_image_url(message: &str) -> Option<String> {
    RE_IMAGE_URL
        .captures(message)
        .map(|caps| caps[1].replace("&amp;", "&"))
}

/// Extract the quoted message id from the first `CQ:reply`.
pub fn extract_reply_id(message: &str) -> Option<String> {
    RE_REPLY.captures(message).map(|caps| caps[1].to_string())
}

/// Whether the message @-mentions the given account.
pub fn contains_at(message: &str, qq: i64) -> bool {
    message.contains(&format!("[CQ:at,qq={}]", qq))
}

/// Strip at/reply/image CQ codes and trim, leaving the user's actual text.
pub fn normalize_user_text(message: &str) -> String {
    let without_reply = RE_REPLY.replace_all(message, "");
    let without_at = RE_AT.replace_all(&without_reply, "");
    let without_image = RE_IMAGE.replace_all(&without_at, "");
    without_image.trim().to_string()
}

/// Wrap a reply quote around a message body.
pub fn quote(message_id: i64, text: &str) -> String {
    format!("[CQ:reply,id={}] {}", message_id, text)
}
