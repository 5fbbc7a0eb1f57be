//! User emotion recognition: rule baseline with optional classifier refinement.
//!
//! The rule engine is a keyword/emoji scoring pass — fast, deterministic, and
//! good enough for most messages. A network-backed classifier can be plugged
//! in to refine ambiguous results; any classifier failure degrades back to
//! the rule result, never to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::scalar::deserialize_safe_f32;

/// The fixed 8-label emotion vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fear,
    Disgust,
    Surprise,
    Calm,
}

impl EmotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Calm => "calm",
        }
    }

    /// Parse a label, coercing anything outside the vocabulary to `Neutral`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "happy" => EmotionLabel::Happy,
            "sad" => EmotionLabel::Sad,
            "angry" => EmotionLabel::Angry,
            "fear" => EmotionLabel::Fear,
            "disgust" => EmotionLabel::Disgust,
            "surprise" => EmotionLabel::Surprise,
            "calm" => EmotionLabel::Calm,
            _ => EmotionLabel::Neutral,
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, EmotionLabel::Angry | EmotionLabel::Disgust)
    }
}

/// Per-message classification result. Ephemeral — consumed by the affect
/// model and stored only as STM turn metadata.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserEmotion {
    pub label: EmotionLabel,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub intensity: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub confidence: f32,
}

impl UserEmotion {
    pub fn new(label: EmotionLabel, intensity: f32, confidence: f32) -> Self {
        Self {
            label,
            intensity: intensity.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn neutral() -> Self {
        Self::new(EmotionLabel::Neutral, 0.3, 0.9)
    }
}

/// Remote classifier capability. This is the one collaborator allowed to
/// error — the recognizer catches failures and falls back to rules.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Returns `(label, intensity, confidence)`.
    async fn classify(&self, text: &str) -> anyhow::Result<(EmotionLabel, f32, f32)>;
}

use EmotionLabel::*;

/// Keyword/emoji -> (label, weight). Weights accumulate per label; the
/// highest total wins. "讨厌" maps to Disgust only (the original word lists
/// carried it twice; last-write-wins made Disgust the effective mapping).
const EMOTION_KEYWORDS: &[(&str, EmotionLabel, f32)] = &[
    // happy
    ("开心", Happy, 0.7),
    ("高兴", Happy, 0.7),
    ("快乐", Happy, 0.7),
    ("好棒", Happy, 0.6),
    ("太好了", Happy, 0.7),
    ("哈哈", Happy, 0.6),
    ("嘻嘻", Happy, 0.5),
    ("233", Happy, 0.5),
    ("666", Happy, 0.5),
    ("厉害", Happy, 0.5),
    ("爱你", Happy, 0.8),
    ("喜欢", Happy, 0.6),
    ("❤", Happy, 0.6),
    ("😊", Happy, 0.6),
    ("😄", Happy, 0.7),
    ("🥰", Happy, 0.7),
    // sad
    ("难过", Sad, 0.7),
    ("伤心", Sad, 0.7),
    ("悲伤", Sad, 0.8),
    ("哭了", Sad, 0.6),
    ("呜呜", Sad, 0.6),
    ("555", Sad, 0.5),
    ("郁闷", Sad, 0.6),
    ("不开心", Sad, 0.6),
    ("😢", Sad, 0.7),
    ("😭", Sad, 0.8),
    ("💔", Sad, 0.6),
    // angry
    ("生气", Angry, 0.7),
    ("愤怒", Angry, 0.8),
    ("烦死了", Angry, 0.7),
    ("滚", Angry, 0.7),
    ("傻逼", Angry, 0.8),
    ("垃圾", Angry, 0.6),
    ("去死", Angry, 0.9),
    ("😠", Angry, 0.7),
    ("😡", Angry, 0.8),
    ("🤬", Angry, 0.9),
    // fear
    ("害怕", Fear, 0.7),
    ("恐惧", Fear, 0.8),
    ("吓人", Fear, 0.6),
    ("可怕", Fear, 0.6),
    ("😨", Fear, 0.7),
    ("😱", Fear, 0.8),
    // disgust
    ("恶心", Disgust, 0.7),
    ("讨厌", Disgust, 0.6),
    ("呕", Disgust, 0.6),
    ("🤮", Disgust, 0.8),
    ("🤢", Disgust, 0.7),
    // surprise
    ("惊讶", Surprise, 0.7),
    ("震惊", Surprise, 0.8),
    ("天哪", Surprise, 0.6),
    ("卧槽", Surprise, 0.6),
    ("我靠", Surprise, 0.6),
    ("😮", Surprise, 0.6),
    ("😲", Surprise, 0.7),
    ("🤯", Surprise, 0.8),
    // calm
    ("平静", Calm, 0.7),
    ("淡定", Calm, 0.7),
    ("冷静", Calm, 0.6),
    ("没事", Calm, 0.5),
    ("还好", Calm, 0.5),
    ("😌", Calm, 0.6),
];

/// Punctuation -> intensity adjustment.
const PUNCTUATION_BOOST: &[(&str, f32)] = &[
    ("！", 0.1),
    ("!", 0.1),
    ("？", 0.05),
    ("?", 0.05),
    ("~", 0.05),
    ("。", -0.05),
];

/// Two-tier emotion recognizer.
#[derive(Debug, Default)]
pub struct EmotionRecognizer;

impl EmotionRecognizer {
    pub fn new() -> Self {
        Self
    }

    /// Rule-only recognition. Pure function of the input text.
    pub fn recognize(&self, text: &str) -> UserEmotion {
        if text.trim().is_empty() {
            return UserEmotion::neutral();
        }

        let lower = text.to_lowercase();
        let mut scores: [f32; 8] = [0.0; 8];
        let mut hits = 0u32;

        for (keyword, label, weight) in EMOTION_KEYWORDS {
            if lower.contains(keyword) || text.contains(keyword) {
                scores[*label as usize] += weight;
                hits += 1;
            }
        }

        if hits == 0 {
            return UserEmotion::new(EmotionLabel::Neutral, 0.3, 0.5);
        }

        let (best_idx, best_score) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        let label = LABEL_ORDER[best_idx];

        let mut intensity = best_score.min(1.0);
        for (punct, boost) in PUNCTUATION_BOOST {
            intensity += text.matches(punct).count() as f32 * boost;
        }
        intensity = intensity.clamp(0.1, 1.0);

        let confidence = (0.4 + hits as f32 * 0.15).min(0.9);

        UserEmotion::new(label, round2(intensity), round2(confidence))
    }

    /// Recognition with optional classifier refinement.
    ///
    /// Short text and confident non-neutral rule hits skip the network call.
    /// Classifier failure of any kind falls back to the rule result.
    pub async fn recognize_with_classifier(
        &self,
        text: &str,
        classifier: Option<&dyn EmotionClassifier>,
    ) -> UserEmotion {
        if text.trim().is_empty() {
            return UserEmotion::neutral();
        }

        if text.chars().count() < 10 {
            return self.recognize(text);
        }

        let rule_result = self.recognize(text);
        if rule_result.confidence >= 0.7 && rule_result.label != EmotionLabel::Neutral {
            tracing::debug!("emotion rules-fast -> {}", rule_result.label.as_str());
            return rule_result;
        }

        if let Some(classifier) = classifier {
            match classifier.classify(text).await {
                Ok((label, intensity, confidence)) => {
                    tracing::debug!("emotion classifier -> {}", label.as_str());
                    return UserEmotion::new(label, intensity, confidence);
                }
                Err(e) => {
                    tracing::warn!("emotion classifier failed, falling back to rules: {}", e);
                }
            }
        }

        tracing::debug!("emotion rules -> {}", rule_result.label.as_str());
        rule_result
    }
}

/// Index order must match the `EmotionLabel` discriminants.
const LABEL_ORDER: [EmotionLabel; 8] =
    [Neutral, Happy, Sad, Angry, Fear, Disgust, Surprise, Calm];

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}
