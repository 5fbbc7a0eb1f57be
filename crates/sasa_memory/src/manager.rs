//! The memory facade: per-user records, relation tracking, LTM promotion,
//! personality estimation, and the process-wide bot affect.
//!
//! Concurrency scheme: a brief map lock hands out one `Arc<Mutex<UserEntry>>`
//! per user id; every read-modify-persist sequence then runs under that
//! per-user lock. Different users proceed concurrently, same-user operations
//! serialize. The map lock is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;

use sasa_ai::llm::{strip_code_fence, TextProvider};
use sasa_core::affect::RelationContext;
use sasa_core::config::MemoryConfig;
use sasa_core::emotion::{EmotionClassifier, EmotionRecognizer, UserEmotion};
use sasa_core::{BotAffect, EmotionLabel};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{LtmEntry, Personality, Relation, StmMeta, StmRole, StmTurn, UserRecord};
use crate::prompt::build_personality_prompt;
use crate::store::MemoryBackend;

/// Keywords that mark a message as biographically significant.
const IMPORTANCE_KEYWORDS: &[&str] = &[
    "生日", "名字", "叫我", "住在", "工作", "学校", "喜欢", "讨厌", "重要",
    "记住", "别忘了", "告诉你", "秘密", "只有你知道", "我是", "我的", "我们",
    "永远", "最",
];

const LTM_TEXT_MAX_CHARS: usize = 200;

struct UserEntry {
    loaded: bool,
    record: UserRecord,
}

/// Read-only digest of one user's memory, rendered for the 查看记忆 command.
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub nickname: String,
    pub self_descriptions: Vec<String>,
    pub total_msgs: u64,
    pub stm_turns: usize,
    pub ltm_entries: Vec<LtmEntry>,
    pub familiarity: f32,
    pub trust: f32,
}

pub struct MemoryManager {
    backend: Arc<dyn MemoryBackend>,
    config: MemoryConfig,
    recognizer: EmotionRecognizer,
    classifier: Option<Arc<dyn EmotionClassifier>>,
    users: Mutex<HashMap<String, Arc<Mutex<UserEntry>>>>,
    bot_affect: Mutex<BotAffect>,
}

impl MemoryManager {
    pub fn new(
        backend: Arc<dyn MemoryBackend>,
        config: MemoryConfig,
        classifier: Option<Arc<dyn EmotionClassifier>>,
    ) -> Self {
        Self {
            backend,
            config,
            recognizer: EmotionRecognizer::new(),
            classifier,
            users: Mutex::new(HashMap::new()),
            bot_affect: Mutex::new(BotAffect::default()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Restore the persisted bot affect, if persistence is enabled. Called
    /// once at startup; absence or load failure keeps the default baseline.
    pub async fn restore_bot_affect(&self) {
        if !self.config.persist_bot_affect {
            return;
        }
        match self.backend.load_bot_affect().await {
            Ok(Some(affect)) => {
                *self.bot_affect.lock().await = affect;
                info!("restored bot affect from disk");
            }
            Ok(None) => {}
            Err(e) => warn!("failed to load bot affect, using baseline: {}", e),
        }
    }

    async fn entry(&self, user_id: &str) -> Arc<Mutex<UserEntry>> {
        let mut map = self.users.lock().await;
        map.entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(UserEntry {
                    loaded: false,
                    record: UserRecord::new(user_id),
                }))
            })
            .clone()
    }

    async fn ensure_loaded(&self, user_id: &str, entry: &mut UserEntry) {
        if entry.loaded {
            return;
        }
        match self.backend.load(user_id).await {
            Ok(Some(record)) => entry.record = record,
            Ok(None) => {}
            Err(e) => warn!(user_id, "failed to load user record, starting empty: {}", e),
        }
        entry.record.user_id = user_id.to_string();
        entry.loaded = true;
    }

    /// Run a mutation under the per-user lock, then persist. Save failure is
    /// logged and non-fatal; the in-memory record stays authoritative.
    async fn with_user<R>(&self, user_id: &str, f: impl FnOnce(&mut UserRecord) -> R) -> R {
        let entry = self.entry(user_id).await;
        let mut guard = entry.lock().await;
        self.ensure_loaded(user_id, &mut guard).await;
        let result = f(&mut guard.record);
        if let Err(e) = self.backend.save(&guard.record).await {
            warn!(user_id, "failed to persist user record: {}", e);
        }
        result
    }

    /// Run a read under the per-user lock without persisting.
    async fn read_user<R>(&self, user_id: &str, f: impl FnOnce(&UserRecord) -> R) -> R {
        let entry = self.entry(user_id).await;
        let mut guard = entry.lock().await;
        self.ensure_loaded(user_id, &mut guard).await;
        f(&guard.record)
    }

    // ------------------------------------------------------------------
    // Emotion
    // ------------------------------------------------------------------

    /// Two-tier emotion recognition on a user message.
    pub async fn recognize(&self, text: &str) -> UserEmotion {
        self.recognizer
            .recognize_with_classifier(text, self.classifier.as_deref())
            .await
    }

    // ------------------------------------------------------------------
    // Short-term memory
    // ------------------------------------------------------------------

    pub async fn append_turn(&self, user_id: &str, role: StmRole, text: &str, meta: StmMeta) {
        let max = self.config.stm_max_turns;
        self.with_user(user_id, |record| {
            record
                .short_term_memory
                .push(StmTurn::new(role, text, meta));
            if record.short_term_memory.len() > max {
                let overflow = record.short_term_memory.len() - max;
                record.short_term_memory.drain(..overflow);
            }
            if role == StmRole::User {
                record.counters.total_msgs += 1;
                record.counters.msgs_since_summary += 1;
            }
        })
        .await
    }

    pub async fn stm_snapshot(&self, user_id: &str) -> Vec<StmTurn> {
        self.read_user(user_id, |r| r.short_term_memory.clone()).await
    }

    /// Full record clone for prompt assembly.
    pub async fn snapshot(&self, user_id: &str) -> UserRecord {
        self.read_user(user_id, |r| r.clone()).await
    }

    // ------------------------------------------------------------------
    // Relation
    // ------------------------------------------------------------------

    pub async fn relation(&self, user_id: &str) -> Relation {
        self.read_user(user_id, |r| r.relation).await
    }

    pub async fn update_relation_on_interaction(&self, user_id: &str) {
        let step = self.config.familiarity_step;
        self.with_user(user_id, |record| {
            record.relation.familiarity = (record.relation.familiarity + step).min(1.0);
            record.relation.last_interaction_ts = chrono::Utc::now().timestamp();
        })
        .await
    }

    /// Strong negative emotion erodes trust, floored at 0.1.
    pub async fn update_relation_on_negative_emotion(&self, user_id: &str, emotion: &UserEmotion) {
        if !emotion.label.is_negative() || emotion.intensity <= 0.6 {
            return;
        }
        let step = self.config.trust_step;
        let intensity = emotion.intensity;
        self.with_user(user_id, |record| {
            record.relation.trust = (record.relation.trust - step * intensity).max(0.1);
        })
        .await
    }

    // ------------------------------------------------------------------
    // Bot affect
    // ------------------------------------------------------------------

    pub async fn bot_affect(&self) -> BotAffect {
        *self.bot_affect.lock().await
    }

    /// Nudge the process-wide VAD state from one user message.
    pub async fn update_bot_affect(&self, user_id: &str, emotion: &UserEmotion) {
        let relation = self.relation(user_id).await;
        let ctx = RelationContext {
            familiarity: relation.familiarity,
            trust: relation.trust,
        };
        let alpha = self.config.emotion_decay_alpha;

        let next = {
            let mut affect = self.bot_affect.lock().await;
            *affect = affect.update(emotion, Some(ctx), alpha);
            *affect
        };

        if self.config.persist_bot_affect {
            if let Err(e) = self.backend.save_bot_affect(&next).await {
                warn!("failed to persist bot affect: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Long-term memory
    // ------------------------------------------------------------------

    /// Scan recent user turns and promote the important ones into LTM.
    /// Returns the number of entries added.
    pub async fn extract_ltm(&self, user_id: &str) -> usize {
        let max_entries = self.config.ltm_max_entries;
        self.with_user(user_id, |record| {
            let mut added = 0;
            let candidates: Vec<(String, f32, StmMeta)> = record
                .short_term_memory
                .iter()
                .filter(|t| t.role == StmRole::User)
                .map(|t| (t.text.clone(), score_importance(t), t.meta.clone()))
                .filter(|(_, importance, _)| *importance >= 0.7)
                .collect();

            for (text, importance, meta) in candidates {
                let text: String = text.chars().take(LTM_TEXT_MAX_CHARS).collect();
                if is_duplicate(&record.long_term_memory, &text) {
                    continue;
                }
                debug!(user_id = %record.user_id, importance, "promoting turn to long-term memory");
                record.long_term_memory.push(LtmEntry {
                    text,
                    ts: chrono::Utc::now().timestamp(),
                    importance,
                    meta,
                });
                added += 1;
            }

            if record.long_term_memory.len() > max_entries {
                record
                    .long_term_memory
                    .sort_by(|a, b| b.importance.total_cmp(&a.importance));
                record.long_term_memory.truncate(max_entries);
            }
            added
        })
        .await
    }

    // ------------------------------------------------------------------
    // Personality
    // ------------------------------------------------------------------

    /// Re-estimate the user's personality from their recent messages.
    ///
    /// Gated on message count since the last estimate AND a cooldown. Any
    /// failure (degraded provider reply, unparseable JSON) leaves both the
    /// personality and the gate untouched, so the next message retries.
    pub async fn maybe_update_personality(
        &self,
        user_id: &str,
        provider: &dyn TextProvider,
    ) -> bool {
        let min_msgs = self.config.personality_update_min_msgs;
        let cooldown_secs = (self.config.personality_update_cooldown_hours * 3600.0) as i64;

        let recent: Option<Vec<String>> = self
            .read_user(user_id, |record| {
                let now = chrono::Utc::now().timestamp();
                if record.counters.msgs_since_summary < min_msgs {
                    return None;
                }
                if now - record.counters.last_summary_ts < cooldown_secs {
                    return None;
                }
                let texts: Vec<String> = record
                    .short_term_memory
                    .iter()
                    .filter(|t| t.role == StmRole::User)
                    .rev()
                    .take(20)
                    .map(|t| t.text.clone())
                    .collect();
                Some(texts.into_iter().rev().collect())
            })
            .await;

        let Some(recent) = recent else {
            return false;
        };
        if recent.is_empty() {
            return false;
        }

        let reply = provider.ask(&build_personality_prompt(&recent)).await;
        if reply.degraded {
            warn!(user_id, "personality estimate skipped: provider degraded");
            return false;
        }

        let parsed: Personality = match serde_json::from_str(strip_code_fence(&reply.text)) {
            Ok(p) => p,
            Err(e) => {
                warn!(user_id, "personality estimate unparseable: {}", e);
                return false;
            }
        };
        let personality = parsed.clamped();

        self.with_user(user_id, |record| {
            record.personality = personality;
            record.counters.msgs_since_summary = 0;
            record.counters.last_summary_ts = chrono::Utc::now().timestamp();
        })
        .await;
        info!(user_id, "personality re-estimated");
        true
    }

    // ------------------------------------------------------------------
    // Profile commands
    // ------------------------------------------------------------------

    pub async fn set_nickname(&self, user_id: &str, nickname: &str) {
        let nickname = nickname.trim().to_string();
        self.with_user(user_id, |record| {
            record.profile.nickname = nickname;
        })
        .await
    }

    pub async fn add_self_description(&self, user_id: &str, description: &str) {
        let description = description.trim().to_string();
        let max = self.config.max_self_descriptions;
        self.with_user(user_id, |record| {
            record.profile.self_descriptions.push(description);
            if record.profile.self_descriptions.len() > max {
                let overflow = record.profile.self_descriptions.len() - max;
                record.profile.self_descriptions.drain(..overflow);
            }
        })
        .await
    }

    pub async fn clear_self_descriptions(&self, user_id: &str) {
        self.with_user(user_id, |record| {
            record.profile.self_descriptions.clear();
        })
        .await
    }

    pub async fn clear_stm(&self, user_id: &str) {
        self.with_user(user_id, |record| {
            record.short_term_memory.clear();
        })
        .await
    }

    pub async fn user_summary(&self, user_id: &str) -> UserSummary {
        self.read_user(user_id, |record| {
            let mut ltm = record.long_term_memory.clone();
            ltm.sort_by(|a, b| b.importance.total_cmp(&a.importance));
            UserSummary {
                nickname: record.profile.nickname.clone(),
                self_descriptions: record.profile.self_descriptions.clone(),
                total_msgs: record.counters.total_msgs,
                stm_turns: record.short_term_memory.len(),
                ltm_entries: ltm,
                familiarity: record.relation.familiarity,
                trust: record.relation.trust,
            }
        })
        .await
    }
}

/// Importance heuristic for LTM promotion.
fn score_importance(turn: &StmTurn) -> f32 {
    let mut score: f32 = 0.3;

    let chars = turn.text.chars().count();
    if chars > 50 {
        score += 0.1;
    }
    if chars > 100 {
        score += 0.1;
    }

    for keyword in IMPORTANCE_KEYWORDS {
        if turn.text.contains(keyword) {
            score += 0.1;
        }
    }

    if let (Some(label), Some(intensity)) = (turn.meta.emotion, turn.meta.intensity) {
        if intensity > 0.6
            && matches!(
                label,
                EmotionLabel::Happy | EmotionLabel::Sad | EmotionLabel::Angry
            )
        {
            score += 0.15;
        }
    }

    if turn.meta.trigger.is_some() {
        score += 0.05;
    }

    score.min(1.0)
}

/// Exact text or identical 20-char prefix counts as a duplicate.
fn is_duplicate(ltm: &[LtmEntry], text: &str) -> bool {
    let prefix: String = text.chars().take(20).collect();
    ltm.iter().any(|e| {
        e.text == text || e.text.chars().take(20).collect::<String>() == prefix
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonStore, StoreError};
    use async_trait::async_trait;
    use sasa_ai::llm::{ChatMessage, Reply};
    use std::sync::Mutex as StdMutex;

    fn manager(dir: &std::path::Path) -> MemoryManager {
        MemoryManager::new(
            Arc::new(JsonStore::new(dir)),
            MemoryConfig::default(),
            None,
        )
    }

    fn manager_with(dir: &std::path::Path, config: MemoryConfig) -> MemoryManager {
        MemoryManager::new(Arc::new(JsonStore::new(dir)), config, None)
    }

    #[tokio::test]
    async fn test_append_turn_counts_and_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(
            dir.path(),
            MemoryConfig {
                stm_max_turns: 3,
                ..Default::default()
            },
        );

        for i in 0..5 {
            mgr.append_turn("1", StmRole::User, &format!("msg {}", i), StmMeta::default())
                .await;
        }
        let stm = mgr.stm_snapshot("1").await;
        assert_eq!(stm.len(), 3);
        assert_eq!(stm[0].text, "msg 2", "oldest turns evicted first");

        let summary = mgr.user_summary("1").await;
        assert_eq!(summary.total_msgs, 5, "counters survive eviction");
    }

    #[tokio::test]
    async fn test_assistant_turns_do_not_bump_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.append_turn("1", StmRole::Assistant, "哼", StmMeta::default())
            .await;
        assert_eq!(mgr.user_summary("1").await.total_msgs, 0);
    }

    #[tokio::test]
    async fn test_record_persists_across_managers() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mgr = manager(dir.path());
            mgr.set_nickname("42", "老王").await;
            mgr.append_turn("42", StmRole::User, "你好", StmMeta::default())
                .await;
        }
        let mgr = manager(dir.path());
        let summary = mgr.user_summary("42").await;
        assert_eq!(summary.nickname, "老王");
        assert_eq!(summary.stm_turns, 1);
    }

    #[tokio::test]
    async fn test_familiarity_rises_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(
            dir.path(),
            MemoryConfig {
                familiarity_step: 0.5,
                ..Default::default()
            },
        );
        for _ in 0..5 {
            mgr.update_relation_on_interaction("1").await;
        }
        assert!((mgr.relation("1").await.familiarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_trust_erodes_on_strong_negative_only() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let mild = UserEmotion::new(EmotionLabel::Angry, 0.5, 0.8);
        mgr.update_relation_on_negative_emotion("1", &mild).await;
        assert!((mgr.relation("1").await.trust - 0.5).abs() < 1e-6);

        let sad = UserEmotion::new(EmotionLabel::Sad, 0.9, 0.8);
        mgr.update_relation_on_negative_emotion("1", &sad).await;
        assert!((mgr.relation("1").await.trust - 0.5).abs() < 1e-6, "sad is not negative");

        let strong = UserEmotion::new(EmotionLabel::Angry, 0.8, 0.8);
        mgr.update_relation_on_negative_emotion("1", &strong).await;
        assert!(mgr.relation("1").await.trust < 0.5);
    }

    #[tokio::test]
    async fn test_trust_floor() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(
            dir.path(),
            MemoryConfig {
                trust_step: 1.0,
                ..Default::default()
            },
        );
        let strong = UserEmotion::new(EmotionLabel::Disgust, 1.0, 0.9);
        for _ in 0..3 {
            mgr.update_relation_on_negative_emotion("1", &strong).await;
        }
        assert!((mgr.relation("1").await.trust - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ltm_promotes_biographical_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        // 3 keyword hits ("生日", "记住", "我的") push this past the threshold.
        let important = "记住我的生日是三月三号，很重要的";
        mgr.append_turn("1", StmRole::User, important, StmMeta::default())
            .await;
        mgr.append_turn("1", StmRole::User, "嗯嗯", StmMeta::default())
            .await;

        assert_eq!(mgr.extract_ltm("1").await, 1);
        // Rescanning the same STM adds nothing.
        assert_eq!(mgr.extract_ltm("1").await, 0);

        let summary = mgr.user_summary("1").await;
        assert_eq!(summary.ltm_entries.len(), 1);
        assert!(summary.ltm_entries[0].text.contains("生日"));
    }

    #[tokio::test]
    async fn test_ltm_cap_evicts_lowest_importance() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(
            dir.path(),
            MemoryConfig {
                ltm_max_entries: 2,
                stm_max_turns: 100,
                ..Default::default()
            },
        );
        // Distinct prefixes so dedupe does not kick in.
        mgr.append_turn("1", StmRole::User, "一号事：记住我的生日很重要", StmMeta::default()).await;
        mgr.append_turn("1", StmRole::User, "二号事：记住我的秘密很重要", StmMeta::default()).await;
        mgr.append_turn("1", StmRole::User, "三号事：记住我的名字很重要，只有你知道，别忘了", StmMeta::default()).await;
        mgr.extract_ltm("1").await;

        let summary = mgr.user_summary("1").await;
        assert_eq!(summary.ltm_entries.len(), 2);
        // The highest-importance entry survives.
        assert!(summary.ltm_entries[0].text.starts_with("三号事"));
    }

    #[test]
    fn test_importance_scoring() {
        let plain = StmTurn::new(StmRole::User, "哈哈", StmMeta::default());
        assert!(score_importance(&plain) < 0.7);

        let emotional = StmTurn::new(
            StmRole::User,
            "我最喜欢的生日礼物，记住了吗",
            StmMeta {
                emotion: Some(EmotionLabel::Happy),
                intensity: Some(0.9),
                ..Default::default()
            },
        );
        assert!(score_importance(&emotional) >= 0.7);
    }

    struct ScriptedProvider {
        reply: StdMutex<Reply>,
    }

    #[async_trait]
    impl TextProvider for ScriptedProvider {
        async fn ask(&self, _question: &str) -> Reply {
            self.reply.lock().unwrap().clone()
        }
        async fn ask_with_messages(&self, _messages: &[ChatMessage]) -> Reply {
            self.reply.lock().unwrap().clone()
        }
    }

    fn ready_manager(dir: &std::path::Path) -> MemoryManager {
        manager_with(
            dir,
            MemoryConfig {
                personality_update_min_msgs: 2,
                personality_update_cooldown_hours: 0.0,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_personality_update_applies_and_resets_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ready_manager(dir.path());
        mgr.append_turn("1", StmRole::User, "哈哈哈今天超开心", StmMeta::default()).await;
        mgr.append_turn("1", StmRole::User, "晚上一起打游戏吗", StmMeta::default()).await;

        let provider = ScriptedProvider {
            reply: StdMutex::new(Reply::ok(
                "```json\n{\"talkative\":0.8,\"optimism\":0.9,\"stability\":0.6,\"politeness\":0.4}\n```",
            )),
        };
        assert!(mgr.maybe_update_personality("1", &provider).await);

        let record = mgr.snapshot("1").await;
        assert!((record.personality.talkative - 0.8).abs() < 1e-6);
        assert_eq!(record.counters.msgs_since_summary, 0);

        // Gate is now closed until enough new messages arrive.
        assert!(!mgr.maybe_update_personality("1", &provider).await);
    }

    #[tokio::test]
    async fn test_personality_failure_leaves_gate_open() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ready_manager(dir.path());
        mgr.append_turn("1", StmRole::User, "你好", StmMeta::default()).await;
        mgr.append_turn("1", StmRole::User, "在吗", StmMeta::default()).await;

        let degraded = ScriptedProvider {
            reply: StdMutex::new(Reply::degraded("脑子瓦特了...")),
        };
        assert!(!mgr.maybe_update_personality("1", &degraded).await);

        let garbage = ScriptedProvider {
            reply: StdMutex::new(Reply::ok("我觉得这个人挺开朗的")),
        };
        assert!(!mgr.maybe_update_personality("1", &garbage).await);

        // Default personality untouched, gate still open: a parseable reply
        // succeeds immediately.
        let record = mgr.snapshot("1").await;
        assert!((record.personality.talkative - 0.5).abs() < 1e-6);
        let good = ScriptedProvider {
            reply: StdMutex::new(Reply::ok(
                "{\"talkative\":0.2,\"optimism\":0.3,\"stability\":0.4,\"politeness\":0.5}",
            )),
        };
        assert!(mgr.maybe_update_personality("1", &good).await);
    }

    #[tokio::test]
    async fn test_personality_values_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ready_manager(dir.path());
        mgr.append_turn("1", StmRole::User, "a", StmMeta::default()).await;
        mgr.append_turn("1", StmRole::User, "b", StmMeta::default()).await;

        let provider = ScriptedProvider {
            reply: StdMutex::new(Reply::ok(
                "{\"talkative\":1.8,\"optimism\":-0.5,\"stability\":0.5,\"politeness\":0.5}",
            )),
        };
        assert!(mgr.maybe_update_personality("1", &provider).await);
        let record = mgr.snapshot("1").await;
        assert_eq!(record.personality.talkative, 1.0);
        assert_eq!(record.personality.optimism, 0.0);
    }

    #[tokio::test]
    async fn test_self_descriptions_capped_oldest_out() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with(
            dir.path(),
            MemoryConfig {
                max_self_descriptions: 2,
                ..Default::default()
            },
        );
        mgr.add_self_description("1", "程序员").await;
        mgr.add_self_description("1", "猫奴").await;
        mgr.add_self_description("1", "夜猫子").await;

        let summary = mgr.user_summary("1").await;
        assert_eq!(summary.self_descriptions, vec!["猫奴", "夜猫子"]);

        mgr.clear_self_descriptions("1").await;
        assert!(mgr.user_summary("1").await.self_descriptions.is_empty());
    }

    #[tokio::test]
    async fn test_clear_stm_keeps_ltm_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.set_nickname("1", "小鱼").await;
        mgr.append_turn("1", StmRole::User, "记住我的生日很重要，别忘了", StmMeta::default())
            .await;
        mgr.extract_ltm("1").await;
        mgr.clear_stm("1").await;

        let summary = mgr.user_summary("1").await;
        assert_eq!(summary.stm_turns, 0);
        assert_eq!(summary.ltm_entries.len(), 1);
        assert_eq!(summary.nickname, "小鱼");
    }

    #[tokio::test]
    async fn test_bot_affect_updates_from_user_emotion() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let before = mgr.bot_affect().await;
        let happy = UserEmotion::new(EmotionLabel::Happy, 0.9, 0.8);
        mgr.update_bot_affect("1", &happy).await;
        let after = mgr.bot_affect().await;
        assert!(after.valence > before.valence);
    }

    #[tokio::test]
    async fn test_bot_affect_persisted_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig {
            persist_bot_affect: true,
            ..Default::default()
        };
        {
            let mgr = manager_with(dir.path(), config.clone());
            let happy = UserEmotion::new(EmotionLabel::Happy, 1.0, 0.9);
            for _ in 0..5 {
                mgr.update_bot_affect("1", &happy).await;
            }
        }
        let mgr = manager_with(dir.path(), config);
        let baseline = mgr.bot_affect().await;
        mgr.restore_bot_affect().await;
        let restored = mgr.bot_affect().await;
        assert!(restored.valence > baseline.valence);
    }

    struct FailingBackend;

    #[async_trait]
    impl MemoryBackend for FailingBackend {
        async fn load(&self, _user_id: &str) -> Result<Option<UserRecord>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk on fire")))
        }
        async fn save(&self, _record: &UserRecord) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk on fire")))
        }
        async fn load_bot_affect(&self) -> Result<Option<BotAffect>, StoreError> {
            Ok(None)
        }
        async fn save_bot_affect(&self, _affect: &BotAffect) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_non_fatal() {
        let mgr = MemoryManager::new(Arc::new(FailingBackend), MemoryConfig::default(), None);
        mgr.append_turn("1", StmRole::User, "你好", StmMeta::default()).await;
        // The in-memory record stays authoritative despite save failures.
        assert_eq!(mgr.stm_snapshot("1").await.len(), 1);
    }
}
