//! The dispatch loop: purge, admission control, first matching rule wins.

use std::sync::Arc;
use std::time::Duration;

use sasa_onebot::RawEvent;
use tracing::{debug, error};

use crate::context::EventContext;
use crate::limiter::RateLimiter;
use crate::rules::{built_in_rules, Rule, Services};

/// Pending callback entries older than this are dropped at the top of every
/// dispatch.
pub const PENDING_TTL: Duration = Duration::from_secs(60);

pub const RATE_LIMIT_NOTICE: &str = "消息有点多啦，稍等一下再试试吧~";

pub struct Dispatcher {
    services: Arc<Services>,
    rules: Vec<Box<dyn Rule>>,
    limiter: RateLimiter,
}

impl Dispatcher {
    pub fn new(services: Arc<Services>, limiter: RateLimiter) -> Self {
        let rules = built_in_rules(services.clone());
        Self {
            services,
            rules,
            limiter,
        }
    }

    /// Route one inbound frame. Returns whether anything handled it.
    pub async fn dispatch(&self, raw: &RawEvent) -> bool {
        self.services.pending.purge_expired(PENDING_TTL);

        let Some(mut ctx) = EventContext::from_event(raw) else {
            return false;
        };

        // The bot's own messages are events too; never answer them.
        if ctx.is_message_event && ctx.user_id == ctx.self_id {
            return false;
        }

        if ctx.is_message_event && !self.limiter.check(ctx.user_id, ctx.group_id) {
            self.services.send_action(sasa_onebot::ApiAction::send_msg(
                &ctx.message_type,
                Some(ctx.user_id),
                ctx.group_id,
                RATE_LIMIT_NOTICE.to_string(),
            ));
            return true;
        }

        for rule in &self.rules {
            if !rule.matches(&ctx) {
                continue;
            }
            debug!(rule = rule.name(), "rule matched");
            match rule.run(&mut ctx).await {
                Ok(true) => return true,
                Ok(false) => continue,
                Err(e) => {
                    // One misbehaving rule must never take down the loop.
                    error!(rule = rule.name(), "rule failed: {:#}", e);
                    continue;
                }
            }
        }
        false
    }
}
