//! Per-conversation behavior overrides, JSON-persisted and cached.
//!
//! Each group (and the "private" bucket for DMs) can override the global
//! random-reply chance and toggle memory or image handling. Unset fields fall
//! back to the global defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Global fallbacks, taken from the bot config at startup.
#[derive(Debug, Clone, Copy)]
pub struct ConversationDefaults {
    pub random_reply_chance: u32,
    pub enable_memory: bool,
    pub enable_image: bool,
}

/// Sparse per-conversation overrides as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_reply_chance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_memory: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_image: Option<bool>,
}

/// Effective settings for one conversation.
#[derive(Debug, Clone, Copy)]
pub struct ConversationSettings {
    pub random_reply_chance: u32,
    pub enable_memory: bool,
    pub enable_image: bool,
}

pub struct ConversationStore {
    path: PathBuf,
    defaults: ConversationDefaults,
    cache: Mutex<HashMap<String, ConversationOverrides>>,
}

impl ConversationStore {
    /// Load overrides from `path` if present; a missing or unreadable file
    /// starts empty.
    pub fn new(path: impl Into<PathBuf>, defaults: ConversationDefaults) -> Self {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!("conversation config unparseable, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            defaults,
            cache: Mutex::new(cache),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ConversationOverrides>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, cache: &HashMap<String, ConversationOverrides>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let text = match serde_json::to_string_pretty(cache) {
            Ok(t) => t,
            Err(e) => {
                warn!("failed to serialize conversation config: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, text) {
            warn!("failed to persist conversation config: {}", e);
        }
    }

    /// Effective settings for a conversation key, defaults applied.
    pub fn settings(&self, key: &str) -> ConversationSettings {
        let cache = self.lock();
        let overrides = cache.get(key).cloned().unwrap_or_default();
        ConversationSettings {
            random_reply_chance: overrides
                .random_reply_chance
                .unwrap_or(self.defaults.random_reply_chance),
            enable_memory: overrides.enable_memory.unwrap_or(self.defaults.enable_memory),
            enable_image: overrides.enable_image.unwrap_or(self.defaults.enable_image),
        }
    }

    pub fn set_memory_enabled(&self, key: &str, enabled: bool) {
        self.update(key, |o| o.enable_memory = Some(enabled));
    }

    pub fn set_image_enabled(&self, key: &str, enabled: bool) {
        self.update(key, |o| o.enable_image = Some(enabled));
    }

    pub fn set_random_reply_chance(&self, key: &str, chance: u32) {
        self.update(key, |o| o.random_reply_chance = Some(chance));
    }

    fn update(&self, key: &str, f: impl FnOnce(&mut ConversationOverrides)) {
        let mut cache = self.lock();
        f(cache.entry(key.to_string()).or_default());
        self.persist(&cache);
    }
}
