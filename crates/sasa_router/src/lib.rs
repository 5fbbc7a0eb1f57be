//! Event routing: turn inbound OneBot frames into bot behavior.
//!
//! The dispatcher owns an ordered rule list; the first matching rule that
//! reports `handled` wins. Shared collaborators (providers, memory, pending
//! callbacks, per-conversation config) live in [`Services`].

pub mod context;
pub mod conversation;
pub mod dispatch;
pub mod limiter;
pub mod pending;
pub mod rules;

pub use context::EventContext;
pub use conversation::{ConversationDefaults, ConversationOverrides, ConversationStore};
pub use dispatch::{Dispatcher, RATE_LIMIT_NOTICE};
pub use limiter::RateLimiter;
pub use pending::{PendingReplies, PendingReply};
pub use rules::{built_in_rules, Rule, Services};
