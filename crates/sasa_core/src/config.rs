use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub server: ServerConfig,
    pub persona: PersonaConfig,
    pub providers: ProviderConfig,
    pub behavior: BehaviorConfig,
    pub memory: MemoryConfig,
    pub rate_limit: RateLimitConfig,
    pub resilience: ResilienceConfig,
}

impl BotConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. Env var overrides are applied after loading.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: BotConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, return
    /// defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DEEPSEEK_API_KEY") {
            self.providers.deepseek_api_key = v;
        }
        if let Ok(v) = std::env::var("DEEPSEEK_BASE_URL") {
            self.providers.deepseek_base_url = v;
        }
        if let Ok(v) = std::env::var("ZHIPU_API_KEY") {
            self.providers.zhipu_api_key = v;
        }
        if let Ok(v) = std::env::var("ALIYUN_API_KEY") {
            self.providers.aliyun_api_key = v;
        }
        if let Ok(v) = std::env::var("SILICONFLOW_API_KEY") {
            self.providers.siliconflow_api_key = v;
        }
        if let Ok(v) = std::env::var("SASA_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("SASA_PORT") {
            if let Ok(n) = v.parse() {
                self.server.port = n;
            }
        }
        if let Ok(v) = std::env::var("SASA_DATA_DIR") {
            self.memory.data_dir = PathBuf::from(v);
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

/// WebSocket server bind address. The OneBot implementation (NapCat) dials
/// in as a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8095,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub system_prompt: String,
    pub vision_prompt: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: "你是一个傲娇的二次元美少女机器人，说话要带一点颜文字，名字叫'鲨鲨'。"
                .to_string(),
            vision_prompt: "你是一个比较专业的摄影师，请简短评价下面的图片内容，不要超过50个字，\
                            一般情况下20字左右。评价可以稍微抽象幽默一点，偶尔也可以批评讽刺，但不要太过分。"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub deepseek_api_key: String,
    pub deepseek_base_url: String,
    pub deepseek_model: String,
    pub zhipu_api_key: String,
    pub aliyun_api_key: String,
    pub siliconflow_api_key: String,
    pub temperature: f32,
    pub max_text_tokens: u32,
    /// Per-request timeout for every outbound provider call, seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            deepseek_api_key: String::new(),
            deepseek_base_url: "https://api.deepseek.com".to_string(),
            deepseek_model: "deepseek-chat".to_string(),
            zhipu_api_key: String::new(),
            aliyun_api_key: String::new(),
            siliconflow_api_key: String::new(),
            temperature: 1.3,
            max_text_tokens: 50,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// 1-in-N chance of replying to an unaddressed group message. 0 disables.
    pub random_reply_chance: u32,
    /// User ids allowed to run per-group toggle commands.
    pub admin_user_ids: Vec<i64>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            random_reply_chance: 200,
            admin_user_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub data_dir: PathBuf,
    pub stm_max_turns: usize,
    pub ltm_max_entries: usize,
    pub max_self_descriptions: usize,
    /// Familiarity gained per interaction, capped at 1.0.
    pub familiarity_step: f32,
    /// Trust lost per unit intensity of a strong negative emotion.
    pub trust_step: f32,
    /// Inertia coefficient for the VAD blend. Higher = heavier inertia.
    pub emotion_decay_alpha: f32,
    pub personality_update_min_msgs: u32,
    pub personality_update_cooldown_hours: f32,
    /// Save the bot VAD snapshot after each update and restore it at startup.
    pub persist_bot_affect: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("data"),
            stm_max_turns: 30,
            ltm_max_entries: 50,
            max_self_descriptions: 5,
            familiarity_step: 0.01,
            trust_step: 0.05,
            emotion_decay_alpha: 0.7,
            personality_update_min_msgs: 20,
            personality_update_cooldown_hours: 12.0,
            persist_bot_affect: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_seconds: u64,
    pub user_max_calls: usize,
    pub group_max_calls: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: 60,
            user_max_calls: 6,
            group_max_calls: 20,
        }
    }
}

/// Retry and circuit-breaker settings shared by all providers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub breaker_fail_threshold: u32,
    pub breaker_cooldown_seconds: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            breaker_fail_threshold: 3,
            breaker_cooldown_seconds: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.server.port, 8095);
        assert!(cfg.memory.stm_max_turns > 0);
        assert!(cfg.memory.emotion_decay_alpha > 0.0 && cfg.memory.emotion_decay_alpha < 1.0);
        assert!(!cfg.memory.persist_bot_affect);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: BotConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [memory]
            stm_max_turns = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.memory.stm_max_turns, 10);
        assert_eq!(cfg.memory.ltm_max_entries, 50);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let cfg = BotConfig::load_or_default("/nonexistent/sasa.toml");
        assert_eq!(cfg.rate_limit.window_seconds, 60);
    }
}
