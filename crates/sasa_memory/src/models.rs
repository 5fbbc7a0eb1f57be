//! Durable per-user memory records.
//!
//! One `UserRecord` per user id, persisted as a single JSON document. All
//! scalar fields run through the NaN/Inf guard on load so a damaged file
//! cannot poison later arithmetic.

use sasa_core::emotion::EmotionLabel;
use sasa_core::scalar::deserialize_safe_f32;
use serde::{Deserialize, Serialize};

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StmRole {
    User,
    Assistant,
}

/// Optional metadata on a short-term memory turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StmMeta {
    pub trigger: Option<String>,
    pub message_type: Option<String>,
    pub group_id: Option<i64>,
    pub has_image: bool,
    pub emotion: Option<EmotionLabel>,
    pub intensity: Option<f32>,
}

impl StmMeta {
    pub fn trigger(name: &str) -> Self {
        Self {
            trigger: Some(name.to_string()),
            ..Default::default()
        }
    }
}

/// One turn in the short-term ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StmTurn {
    pub role: StmRole,
    pub text: String,
    pub ts: i64,
    #[serde(default)]
    pub meta: StmMeta,
}

impl StmTurn {
    pub fn new(role: StmRole, text: impl Into<String>, meta: StmMeta) -> Self {
        Self {
            role,
            text: text.into(),
            ts: now_ts(),
            meta,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub nickname: String,
    pub self_descriptions: Vec<String>,
}

/// Four personality traits in [0, 1], re-estimated periodically from the
/// user's own messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Personality {
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub talkative: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub optimism: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub stability: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub politeness: f32,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            talkative: 0.5,
            optimism: 0.5,
            stability: 0.5,
            politeness: 0.5,
        }
    }
}

impl Personality {
    pub fn clamped(self) -> Self {
        Self {
            talkative: self.talkative.clamp(0.0, 1.0),
            optimism: self.optimism.clamp(0.0, 1.0),
            stability: self.stability.clamp(0.0, 1.0),
            politeness: self.politeness.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub total_msgs: u64,
    pub msgs_since_summary: u32,
    pub last_summary_ts: i64,
}

/// An important event promoted out of STM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtmEntry {
    pub text: String,
    pub ts: i64,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub importance: f32,
    #[serde(default)]
    pub meta: StmMeta,
}

/// Relationship between the bot and one user. Familiarity only rises;
/// trust drops on strong negative emotion, floored at 0.1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Relation {
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub familiarity: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub trust: f32,
    pub last_interaction_ts: i64,
}

impl Default for Relation {
    fn default() -> Self {
        Self {
            familiarity: 0.1,
            trust: 0.5,
            last_interaction_ts: 0,
        }
    }
}

/// Complete durable state for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    pub user_id: String,
    pub profile: Profile,
    pub personality: Personality,
    pub short_term_memory: Vec<StmTurn>,
    pub long_term_memory: Vec<LtmEntry>,
    pub counters: Counters,
    pub relation: Relation,
}

impl Default for UserRecord {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            profile: Profile::default(),
            personality: Personality::default(),
            short_term_memory: Vec::new(),
            long_term_memory: Vec::new(),
            counters: Counters::default(),
            relation: Relation::default(),
        }
    }
}

impl UserRecord {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_roundtrip() {
        let mut record = UserRecord::new("10001");
        record.profile.nickname = "阿水".to_string();
        record.short_term_memory.push(StmTurn::new(
            StmRole::User,
            "今天好开心",
            StmMeta {
                emotion: Some(EmotionLabel::Happy),
                intensity: Some(0.7),
                ..Default::default()
            },
        ));
        record.long_term_memory.push(LtmEntry {
            text: "我的生日是3月3日".to_string(),
            ts: 1,
            importance: 0.8,
            meta: StmMeta::default(),
        });

        let json = serde_json::to_string(&record).unwrap();
        let restored: UserRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.profile.nickname, "阿水");
        assert_eq!(restored.short_term_memory.len(), 1);
        assert_eq!(restored.short_term_memory[0].meta.emotion, Some(EmotionLabel::Happy));
        assert_eq!(restored.long_term_memory[0].text, "我的生日是3月3日");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let restored: UserRecord = serde_json::from_str(r#"{"user_id": "7"}"#).unwrap();
        assert_eq!(restored.user_id, "7");
        assert!((restored.relation.familiarity - 0.1).abs() < 1e-6);
        assert!((restored.relation.trust - 0.5).abs() < 1e-6);
        assert!((restored.personality.optimism - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_corrupt_scalar_sanitized_on_load() {
        // NaN is not valid JSON, but Infinity-like corruption shows up as
        // huge exponents; the guard handles whatever f32::deserialize yields.
        let json = r#"{"user_id": "7", "relation": {"familiarity": 1e999, "trust": 0.5, "last_interaction_ts": 0}}"#;
        let restored: UserRecord = serde_json::from_str(json).unwrap();
        assert!(restored.relation.familiarity.is_finite());
    }

    #[test]
    fn test_personality_clamped() {
        let p = Personality {
            talkative: 1.7,
            optimism: -0.2,
            stability: 0.4,
            politeness: 0.9,
        }
        .clamped();
        assert_eq!(p.talkative, 1.0);
        assert_eq!(p.optimism, 0.0);
        assert_eq!(p.stability, 0.4);
    }
}
