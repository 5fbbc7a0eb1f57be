//! Wire the configured providers, memory, and router state together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sasa_ai::{
    retry::RetryConfig, AliyunImageEdit, CircuitBreaker, DeepSeekText, SiliconFlowClassifier,
    ZhipuVision,
};
use sasa_core::emotion::EmotionClassifier;
use sasa_core::BotConfig;
use sasa_memory::{JsonStore, MemoryManager};
use sasa_onebot::ApiAction;
use sasa_router::{
    ConversationDefaults, ConversationStore, Dispatcher, PendingReplies, RateLimiter, Services,
};
use tokio::sync::mpsc;

fn breaker(config: &BotConfig) -> CircuitBreaker {
    CircuitBreaker::new(
        config.resilience.breaker_fail_threshold,
        Duration::from_secs(config.resilience.breaker_cooldown_seconds),
    )
}

/// Build the dispatcher and the outbound action channel from config.
pub async fn build(config: &BotConfig) -> Result<(Dispatcher, mpsc::UnboundedReceiver<ApiAction>)> {
    let timeout = Duration::from_secs(config.providers.timeout_secs);
    let retry = RetryConfig::new(
        config.resilience.retry_attempts,
        Duration::from_millis(config.resilience.retry_base_delay_ms),
    );

    let text = Arc::new(DeepSeekText::new(
        &config.providers.deepseek_api_key,
        &config.providers.deepseek_base_url,
        &config.providers.deepseek_model,
        &config.persona.system_prompt,
        config.providers.temperature,
        config.providers.max_text_tokens,
        timeout,
        retry.clone(),
        breaker(config),
    )?);
    let vision = Arc::new(ZhipuVision::new(
        &config.providers.zhipu_api_key,
        &config.persona.system_prompt,
        &config.persona.vision_prompt,
        config.providers.temperature,
        timeout,
        retry.clone(),
        breaker(config),
    )?);
    let image_edit = Arc::new(AliyunImageEdit::new(
        &config.providers.aliyun_api_key,
        timeout,
        retry,
        breaker(config),
    )?);

    let classifier: Option<Arc<dyn EmotionClassifier>> =
        if config.providers.siliconflow_api_key.is_empty() {
            None
        } else {
            Some(Arc::new(SiliconFlowClassifier::new(
                &config.providers.siliconflow_api_key,
                timeout,
            )?))
        };

    let memory = Arc::new(MemoryManager::new(
        Arc::new(JsonStore::new(&config.memory.data_dir)),
        config.memory.clone(),
        classifier,
    ));
    memory.restore_bot_affect().await;

    let conversations = Arc::new(ConversationStore::new(
        config.memory.data_dir.join("conversations.json"),
        ConversationDefaults {
            random_reply_chance: config.behavior.random_reply_chance,
            enable_memory: config.memory.enabled,
            enable_image: true,
        },
    ));

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let services = Arc::new(Services {
        text,
        vision,
        image_edit,
        memory,
        pending: Arc::new(PendingReplies::new()),
        conversations,
        persona: config.persona.clone(),
        behavior: config.behavior.clone(),
        outbox: outbox_tx,
    });

    let dispatcher = Dispatcher::new(services, RateLimiter::new(&config.rate_limit));
    Ok((dispatcher, outbox_rx))
}
