//! Sliding-window admission control, per user and per conversation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sasa_core::config::RateLimitConfig;
use tracing::debug;

struct Window {
    timestamps: VecDeque<Instant>,
}

impl Window {
    fn admit(&mut self, now: Instant, window: Duration, max: usize) -> bool {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() >= max {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

pub struct RateLimiter {
    enabled: bool,
    window: Duration,
    user_max: usize,
    group_max: usize,
    users: Mutex<HashMap<i64, Window>>,
    groups: Mutex<HashMap<i64, Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            window: Duration::from_secs(config.window_seconds),
            user_max: config.user_max_calls,
            group_max: config.group_max_calls,
            users: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Both the user window and (for group events) the group window must
    /// admit. Timestamps are only recorded on a window that admits.
    pub fn check(&self, user_id: i64, group_id: Option<i64>) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();

        if let Some(group_id) = group_id {
            let group_ok = {
                let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
                groups
                    .entry(group_id)
                    .or_insert_with(|| Window { timestamps: VecDeque::new() })
                    .admit(now, self.window, self.group_max)
            };
            if !group_ok {
                debug!(group_id, "group rate limit hit");
                return false;
            }
        }

        let user_ok = {
            let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            users
                .entry(user_id)
                .or_insert_with(|| Window { timestamps: VecDeque::new() })
                .admit(now, self.window, self.user_max)
        };
        if !user_ok {
            debug!(user_id, "user rate limit hit");
        }
        user_ok
    }
}
