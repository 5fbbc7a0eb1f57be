//! Pending callback entries for the quoted-message correlation protocol.
//!
//! A rule that needs the content of a quoted message issues `get_msg` tagged
//! with a `reply_check_<id>` echo and parks the originating event here. The
//! matching API response pops the entry; a duplicate response finds nothing
//! and is dropped, so each request is handled at most once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone)]
pub struct PendingReply {
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub message_type: String,
    pub message_id: i64,
    /// Raw message of the originating event (the one that quoted).
    pub raw_msg: String,
    pub created_at: Instant,
}

impl PendingReply {
    pub fn new(
        user_id: i64,
        group_id: Option<i64>,
        message_type: &str,
        message_id: i64,
        raw_msg: &str,
    ) -> Self {
        Self {
            user_id,
            group_id,
            message_type: message_type.to_string(),
            message_id,
            raw_msg: raw_msg.to_string(),
            created_at: Instant::now(),
        }
    }
}

#[derive(Default)]
pub struct PendingReplies {
    entries: Mutex<HashMap<String, PendingReply>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingReply>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One entry per token; a second insert under the same token replaces it.
    pub fn insert(&self, echo: &str, entry: PendingReply) {
        self.lock().insert(echo.to_string(), entry);
    }

    /// Read-and-remove. The second take for the same token returns `None`.
    pub fn take(&self, echo: &str) -> Option<PendingReply> {
        self.lock().remove(echo)
    }

    /// Drop entries older than `ttl`. The transport may simply never answer.
    pub fn purge_expired(&self, ttl: Duration) {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.created_at.elapsed() < ttl);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "dropped expired pending replies");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> PendingReply {
        PendingReply::new(1, Some(2), "group", 42, "[CQ:reply,id=7] 这是什么")
    }

    #[test]
    fn test_take_is_idempotent() {
        let pending = PendingReplies::new();
        pending.insert("reply_check_42", entry());
        assert!(pending.take("reply_check_42").is_some());
        assert!(pending.take("reply_check_42").is_none(), "second take finds nothing");
    }

    #[test]
    fn test_unknown_token_yields_none() {
        let pending = PendingReplies::new();
        assert!(pending.take("reply_check_999").is_none());
    }

    #[test]
    fn test_purge_drops_only_expired() {
        let pending = PendingReplies::new();
        let mut old = entry();
        old.created_at = Instant::now() - Duration::from_secs(120);
        pending.insert("reply_check_1", old);
        pending.insert("reply_check_2", entry());

        pending.purge_expired(Duration::from_secs(60));
        assert!(pending.take("reply_check_1").is_none());
        assert!(pending.take("reply_check_2").is_some());
    }
}
