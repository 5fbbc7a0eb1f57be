//! JSON-file persistence for user records and bot affect.
//!
//! Layout under the data dir:
//!   users/<user_id>.json  — one `UserRecord` per user
//!   bot_state.json        — the bot's own affect state
//!
//! Writes go through a temp file + rename so a crash mid-write never leaves
//! a truncated record behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sasa_core::BotAffect;
use thiserror::Error;
use tracing::debug;

use crate::models::UserRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Persistence seam for memory state. The file-backed implementation is the
/// only one in production; tests swap in an in-memory one where convenient.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn save(&self, record: &UserRecord) -> Result<(), StoreError>;
    async fn load_bot_affect(&self) -> Result<Option<BotAffect>, StoreError>;
    async fn save_bot_affect(&self, affect: &BotAffect) -> Result<(), StoreError>;
}

pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        // User ids come off the wire; keep only safe characters so a crafted
        // id cannot escape the data dir.
        let safe: String = user_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        self.base_dir.join("users").join(format!("{}.json", safe))
    }

    fn bot_state_path(&self) -> PathBuf {
        self.base_dir.join("bot_state.json")
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl MemoryBackend for JsonStore {
    async fn load(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let path = self.user_path(user_id);
        tokio::task::spawn_blocking(move || read_json(&path)).await?
    }

    async fn save(&self, record: &UserRecord) -> Result<(), StoreError> {
        let path = self.user_path(&record.user_id);
        let record = record.clone();
        debug!(user_id = %record.user_id, "persisting user record");
        tokio::task::spawn_blocking(move || write_json(&path, &record)).await?
    }

    async fn load_bot_affect(&self) -> Result<Option<BotAffect>, StoreError> {
        let path = self.bot_state_path();
        tokio::task::spawn_blocking(move || read_json(&path)).await?
    }

    async fn save_bot_affect(&self, affect: &BotAffect) -> Result<(), StoreError> {
        let path = self.bot_state_path();
        let affect = affect.clone();
        tokio::task::spawn_blocking(move || write_json(&path, &affect)).await?
    }
}
