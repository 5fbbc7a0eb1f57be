//! Bot affect state on the VAD (Valence-Arousal-Dominance) model.
//!
//! Unlike the per-user emotion labels, this is one continuous state for the
//! whole process. Each conversational turn nudges it toward a target derived
//! from the recognized user emotion, with inertia keeping swings gradual.

use serde::{Deserialize, Serialize};

use crate::emotion::{EmotionLabel, UserEmotion};
use crate::scalar::deserialize_safe_f32;

/// Relationship context fed into the affect update. Familiarity dampens
/// swings; trust nudges dominance up.
#[derive(Debug, Clone, Copy)]
pub struct RelationContext {
    pub familiarity: f32,
    pub trust: f32,
}

/// Process-wide bot emotional state.
///
/// Valence in [-1, 1], arousal and dominance in [0, 1]. The `*_base` fields
/// are the fixed baseline the state decays toward between stimuli.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BotAffect {
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub valence: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub arousal: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub dominance: f32,

    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub valence_base: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub arousal_base: f32,
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub dominance_base: f32,
}

impl Default for BotAffect {
    fn default() -> Self {
        Self {
            valence: 0.3, // slightly positive baseline
            arousal: 0.3,
            dominance: 0.5,
            valence_base: 0.3,
            arousal_base: 0.3,
            dominance_base: 0.5,
        }
    }
}

/// User emotion label -> (dV, dA, dD) before damping.
fn vad_delta(label: EmotionLabel) -> (f32, f32, f32) {
    match label {
        EmotionLabel::Neutral => (0.0, 0.0, 0.0),
        EmotionLabel::Happy => (0.3, 0.2, 0.1),
        EmotionLabel::Sad => (-0.2, -0.1, -0.1),
        EmotionLabel::Angry => (-0.2, 0.3, 0.2),
        EmotionLabel::Fear => (-0.3, 0.2, -0.2),
        EmotionLabel::Disgust => (-0.2, 0.1, 0.1),
        EmotionLabel::Surprise => (0.1, 0.3, 0.0),
        EmotionLabel::Calm => (0.1, -0.2, 0.1),
    }
}

impl BotAffect {
    pub fn clamp(&mut self) {
        self.valence = self.valence.clamp(-1.0, 1.0);
        self.arousal = self.arousal.clamp(0.0, 1.0);
        self.dominance = self.dominance.clamp(0.0, 1.0);
    }

    /// Blend toward `baseline + damped delta` with inertia `alpha`
    /// (`new = alpha·prev + (1−alpha)·target`).
    ///
    /// The 0.3 scale keeps the bot from mirroring extreme user swings;
    /// familiarity further dampens valence/arousal, trust lifts dominance.
    pub fn update(
        &self,
        user_emotion: &UserEmotion,
        relation: Option<RelationContext>,
        alpha: f32,
    ) -> BotAffect {
        let (mut dv, mut da, mut dd) = vad_delta(user_emotion.label);

        let scale = user_emotion.intensity * 0.3;
        dv *= scale;
        da *= scale;
        dd *= scale;

        if let Some(rel) = relation {
            dv *= 1.0 - rel.familiarity * 0.3;
            da *= 1.0 - rel.familiarity * 0.3;
            dd += rel.trust * 0.05;
        }

        let target_v = self.valence_base + dv;
        let target_a = self.arousal_base + da;
        let target_d = self.dominance_base + dd;

        let mut next = BotAffect {
            valence: alpha * self.valence + (1.0 - alpha) * target_v,
            arousal: alpha * self.arousal + (1.0 - alpha) * target_a,
            dominance: alpha * self.dominance + (1.0 - alpha) * target_d,
            ..*self
        };
        next.clamp();
        next
    }

    /// Map the (V, A) quadrant to a tone hint for prompt assembly. Pure.
    pub fn suggested_tone(&self) -> &'static str {
        if self.valence > 0.5 && self.arousal > 0.5 {
            "热情活泼"
        } else if self.valence > 0.3 && self.arousal < 0.4 {
            "温和平静"
        } else if self.valence < -0.3 && self.arousal > 0.5 {
            "急躁不安"
        } else if self.valence < -0.3 && self.arousal < 0.4 {
            "低落消沉"
        } else if self.valence > 0.3 {
            "友好积极"
        } else if self.valence < -0.1 {
            "略显疲惫"
        } else {
            "平稳中性"
        }
    }
}
