pub mod affect;
pub mod config;
pub mod emotion;
pub mod scalar;

pub use affect::BotAffect;
pub use config::BotConfig;
pub use emotion::{EmotionClassifier, EmotionLabel, EmotionRecognizer, UserEmotion};
