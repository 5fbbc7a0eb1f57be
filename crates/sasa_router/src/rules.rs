//! The rule set: matchers are pure and cheap, `run` does the work.
//!
//! Rules share one [`Services`] bundle. Replies never surface provider
//! errors — the provider layer already degrades to in-persona fallback text,
//! so a rule's job is routing and memory bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use sasa_ai::{ImageEditProvider, TextProvider, VisionProvider};
use sasa_core::config::{BehaviorConfig, PersonaConfig};
use sasa_memory::prompt::{build_chat_messages, build_system_context, format_memory_summary};
use sasa_memory::{MemoryManager, StmMeta, StmRole};
use sasa_onebot::{cq, ApiAction};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::{EventContext, REPLY_ECHO_PREFIX};
use crate::conversation::{ConversationSettings, ConversationStore};
use crate::pending::{PendingReplies, PendingReply};

const EDIT_PREFIX: &str = "编辑=";
const EDIT_USAGE: &str = "要告诉我怎么编辑呀，比如：编辑=把背景换成星空";
const NO_PERMISSION: &str = "你没有权限哦~";
const MEMORY_OFF: &str = "这里的记忆功能是关着的哦~";

/// History bounds for the two chat paths.
const CHAT_HISTORY: usize = 20;
const CHITCHAT_HISTORY: usize = 6;

/// Everything a rule may touch, shared across the dispatcher.
pub struct Services {
    pub text: Arc<dyn TextProvider>,
    pub vision: Arc<dyn VisionProvider>,
    pub image_edit: Arc<dyn ImageEditProvider>,
    pub memory: Arc<MemoryManager>,
    pub pending: Arc<PendingReplies>,
    pub conversations: Arc<ConversationStore>,
    pub persona: PersonaConfig,
    pub behavior: BehaviorConfig,
    pub outbox: mpsc::UnboundedSender<ApiAction>,
}

impl Services {
    pub fn send_action(&self, action: ApiAction) {
        if self.outbox.send(action).is_err() {
            warn!("outbox closed, dropping outbound action");
        }
    }

    fn send_reply(&self, ctx: &EventContext, text: String) {
        self.send_action(ApiAction::send_msg(
            &ctx.message_type,
            Some(ctx.user_id),
            ctx.group_id,
            text,
        ));
    }

    /// Group replies quote the triggering message; private ones go plain.
    fn send_chat_reply(&self, ctx: &EventContext, text: &str) {
        let message = if ctx.message_type == "group" {
            cq::quote(ctx.message_id, text)
        } else {
            text.to_string()
        };
        self.send_reply(ctx, message);
    }

    fn settings(&self, ctx: &EventContext) -> ConversationSettings {
        self.conversations.settings(&ctx.conversation_key())
    }

    fn memory_on(&self, ctx: &EventContext) -> bool {
        self.memory.config().enabled && self.settings(ctx).enable_memory
    }
}

#[async_trait]
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    /// Pure, no side effects.
    fn matches(&self, ctx: &EventContext) -> bool;
    /// Returns whether the event was handled.
    async fn run(&self, ctx: &mut EventContext) -> anyhow::Result<bool>;
}

/// The built-in rule set in priority order. The callback rule is strictly
/// first so a fetched quote can never be misread as a fresh message.
pub fn built_in_rules(services: Arc<Services>) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ReplyCallbackRule { services: services.clone() }),
        Box::new(CommandRule { services: services.clone() }),
        Box::new(MentionedWithImageRule { services: services.clone() }),
        Box::new(MentionedWithReplyRule { services: services.clone() }),
        Box::new(MentionedTextRule { services: services.clone() }),
        Box::new(RandomChitchatRule { services }),
    ]
}

// ----------------------------------------------------------------------
// Shared chat path
// ----------------------------------------------------------------------

/// The memory-augmented chat path: recognize emotion, record the user turn,
/// build system context plus bounded history, ask, record the reply, update
/// relation and affect, then kick off background consolidation.
async fn memory_chat(
    services: &Services,
    ctx: &EventContext,
    question: &str,
    trigger: &'static str,
    max_history: usize,
) -> String {
    if !services.memory_on(ctx) {
        return services.text.ask(question).await.text;
    }

    let user_id = ctx.user_id.to_string();
    let memory = &services.memory;

    let emotion = memory.recognize(question).await;
    debug!(user = %user_id, emotion = emotion.label.as_str(), "user emotion");

    let meta = StmMeta {
        trigger: Some(trigger.to_string()),
        message_type: Some(ctx.message_type.clone()),
        group_id: ctx.group_id,
        has_image: false,
        emotion: Some(emotion.label),
        intensity: Some(emotion.intensity),
    };
    memory.append_turn(&user_id, StmRole::User, question, meta).await;

    let record = memory.snapshot(&user_id).await;
    let affect = memory.bot_affect().await;
    let system = build_system_context(&record, &emotion, &affect, &services.persona.system_prompt);
    let messages = build_chat_messages(&record.short_term_memory, question, &system, max_history);

    let reply = services.text.ask_with_messages(&messages).await;

    if !reply.degraded {
        memory
            .append_turn(&user_id, StmRole::Assistant, &reply.text, StmMeta::trigger(trigger))
            .await;
        memory.update_relation_on_interaction(&user_id).await;
        memory.update_relation_on_negative_emotion(&user_id, &emotion).await;
        memory.update_bot_affect(&user_id, &emotion).await;

        // Consolidation runs after the reply is out; per-user locking keeps
        // it serialized with any concurrent turns.
        let memory = services.memory.clone();
        let text = services.text.clone();
        tokio::spawn(async move {
            memory.extract_ltm(&user_id).await;
            memory.maybe_update_personality(&user_id, text.as_ref()).await;
        });
    }

    reply.text
}

/// Vision path with lightweight memory bookkeeping.
async fn vision_reply(services: &Services, ctx: &EventContext, image_url: &str) -> String {
    let reply = services.vision.ask(image_url, None).await;
    if services.memory_on(ctx) && !reply.degraded {
        let user_id = ctx.user_id.to_string();
        let user_text = if ctx.text.is_empty() {
            "[图片]".to_string()
        } else {
            format!("[图片] {}", ctx.text)
        };
        let meta = StmMeta {
            trigger: Some("image".to_string()),
            message_type: Some(ctx.message_type.clone()),
            group_id: ctx.group_id,
            has_image: true,
            ..Default::default()
        };
        services.memory.append_turn(&user_id, StmRole::User, &user_text, meta).await;
        services
            .memory
            .append_turn(&user_id, StmRole::Assistant, &reply.text, StmMeta::trigger("image"))
            .await;
        services.memory.update_relation_on_interaction(&user_id).await;
    }
    reply.text
}

// ----------------------------------------------------------------------
// 1. reply_callback — a get_msg response matched to a pending entry
// ----------------------------------------------------------------------

struct ReplyCallbackRule {
    services: Arc<Services>,
}

#[async_trait]
impl Rule for ReplyCallbackRule {
    fn name(&self) -> &'static str {
        "reply_callback"
    }

    fn matches(&self, ctx: &EventContext) -> bool {
        ctx.is_reply_callback
    }

    async fn run(&self, ctx: &mut EventContext) -> anyhow::Result<bool> {
        let echo = ctx.echo.clone().unwrap_or_default();
        let Some(entry) = self.services.pending.take(&echo) else {
            // Late or duplicate response; already handled or expired.
            debug!(echo, "no pending entry for callback, dropping");
            return Ok(true);
        };

        // The context now represents the originating message.
        ctx.user_id = entry.user_id;
        ctx.group_id = entry.group_id;
        ctx.message_type = entry.message_type.clone();
        ctx.message_id = entry.message_id;

        let quoted = ctx.raw_msg.clone();
        let user_text = cq::normalize_user_text(&entry.raw_msg);

        if let Some(image_url) = cq::extract_image_url(&quoted) {
            if !self.services.settings(ctx).enable_image {
                return Ok(true);
            }
            let answer = if let Some(instruction) = user_text.strip_prefix(EDIT_PREFIX) {
                let instruction = instruction.trim();
                if instruction.is_empty() {
                    EDIT_USAGE.to_string()
                } else {
                    self.services.image_edit.edit(&image_url, instruction).await.text
                }
            } else {
                vision_reply(&self.services, ctx, &image_url).await
            };
            self.services.send_chat_reply(ctx, &answer);
            return Ok(true);
        }

        let quoted_text = cq::normalize_user_text(&quoted);
        let question = if user_text.is_empty() {
            format!("对方引用了这句话：「{}」，请你回应一下", quoted_text)
        } else {
            format!("对方引用了这句话：「{}」，然后对你说：{}", quoted_text, user_text)
        };
        let answer = memory_chat(&self.services, ctx, &question, "reply", CHAT_HISTORY).await;
        self.services.send_chat_reply(ctx, &answer);
        Ok(true)
    }
}

// ----------------------------------------------------------------------
// 2. profile / admin commands
// ----------------------------------------------------------------------

struct CommandRule {
    services: Arc<Services>,
}

fn is_command(text: &str) -> bool {
    matches!(text, "清除自述" | "清除记忆" | "查看记忆" | "记忆开" | "记忆关")
        || text.starts_with("昵称=")
        || text.starts_with("自述=")
}

#[async_trait]
impl Rule for CommandRule {
    fn name(&self) -> &'static str {
        "command"
    }

    fn matches(&self, ctx: &EventContext) -> bool {
        ctx.is_message_event && ctx.is_mentioned && is_command(&ctx.text)
    }

    async fn run(&self, ctx: &mut EventContext) -> anyhow::Result<bool> {
        let services = &self.services;
        let user_id = ctx.user_id.to_string();

        // Per-group toggles work regardless of the current memory state.
        if ctx.text == "记忆开" || ctx.text == "记忆关" {
            if !services.behavior.admin_user_ids.contains(&ctx.user_id) {
                services.send_chat_reply(ctx, NO_PERMISSION);
                return Ok(true);
            }
            let enable = ctx.text == "记忆开";
            services.conversations.set_memory_enabled(&ctx.conversation_key(), enable);
            info!(key = %ctx.conversation_key(), enable, "memory toggled");
            let notice = if enable {
                "这里的记忆功能打开啦~"
            } else {
                "这里的记忆功能关掉啦~"
            };
            services.send_chat_reply(ctx, notice);
            return Ok(true);
        }

        if !services.memory_on(ctx) {
            services.send_chat_reply(ctx, MEMORY_OFF);
            return Ok(true);
        }

        let reply = if let Some(name) = ctx.text.strip_prefix("昵称=") {
            let name = name.trim();
            if name.is_empty() {
                "昵称不能是空的哦~".to_string()
            } else {
                services.memory.set_nickname(&user_id, name).await;
                format!("好啦，以后就叫你「{}」~", name)
            }
        } else if let Some(desc) = ctx.text.strip_prefix("自述=") {
            if desc.trim().is_empty() {
                "自述不能是空的哦~".to_string()
            } else {
                services.memory.add_self_description(&user_id, desc).await;
                "记住啦~".to_string()
            }
        } else {
            match ctx.text.as_str() {
                "清除自述" => {
                    services.memory.clear_self_descriptions(&user_id).await;
                    "自述都忘掉啦~".to_string()
                }
                "清除记忆" => {
                    services.memory.clear_stm(&user_id).await;
                    "咱们之前聊的我都忘掉啦~".to_string()
                }
                "查看记忆" => {
                    let summary = services.memory.user_summary(&user_id).await;
                    format_memory_summary(&summary)
                }
                other => anyhow::bail!("unreachable command: {}", other),
            }
        };
        services.send_chat_reply(ctx, &reply);
        Ok(true)
    }
}

// ----------------------------------------------------------------------
// 3. mentioned with an attached image
// ----------------------------------------------------------------------

struct MentionedWithImageRule {
    services: Arc<Services>,
}

#[async_trait]
impl Rule for MentionedWithImageRule {
    fn name(&self) -> &'static str {
        "mentioned_with_image"
    }

    fn matches(&self, ctx: &EventContext) -> bool {
        ctx.is_message_event && ctx.is_mentioned && ctx.img_url.is_some()
    }

    async fn run(&self, ctx: &mut EventContext) -> anyhow::Result<bool> {
        if !self.services.settings(ctx).enable_image {
            return Ok(false);
        }
        let image_url = ctx.img_url.clone().unwrap_or_default();
        let answer = vision_reply(&self.services, ctx, &image_url).await;
        self.services.send_chat_reply(ctx, &answer);
        Ok(true)
    }
}

// ----------------------------------------------------------------------
// 4. mentioned while quoting — fetch the quoted message first
// ----------------------------------------------------------------------

struct MentionedWithReplyRule {
    services: Arc<Services>,
}

#[async_trait]
impl Rule for MentionedWithReplyRule {
    fn name(&self) -> &'static str {
        "mentioned_with_reply"
    }

    fn matches(&self, ctx: &EventContext) -> bool {
        ctx.is_message_event && ctx.is_mentioned && ctx.reply_id.is_some()
    }

    async fn run(&self, ctx: &mut EventContext) -> anyhow::Result<bool> {
        let reply_id = ctx.reply_id.clone().unwrap_or_default();
        let echo = format!("{}{}", REPLY_ECHO_PREFIX, ctx.message_id);
        self.services.pending.insert(
            &echo,
            PendingReply::new(
                ctx.user_id,
                ctx.group_id,
                &ctx.message_type,
                ctx.message_id,
                &ctx.raw_msg,
            ),
        );
        self.services.send_action(ApiAction::get_msg(&reply_id, &echo));
        debug!(echo, "parked event, fetching quoted message");
        Ok(true)
    }
}

// ----------------------------------------------------------------------
// 5. plain mentioned text
// ----------------------------------------------------------------------

struct MentionedTextRule {
    services: Arc<Services>,
}

#[async_trait]
impl Rule for MentionedTextRule {
    fn name(&self) -> &'static str {
        "mentioned_text"
    }

    fn matches(&self, ctx: &EventContext) -> bool {
        ctx.is_message_event && ctx.is_mentioned && !ctx.text.is_empty()
    }

    async fn run(&self, ctx: &mut EventContext) -> anyhow::Result<bool> {
        let question = ctx.text.clone();
        let answer = memory_chat(&self.services, ctx, &question, "mention", CHAT_HISTORY).await;
        self.services.send_chat_reply(ctx, &answer);
        Ok(true)
    }
}

// ----------------------------------------------------------------------
// 6. random chitchat on unaddressed group messages
// ----------------------------------------------------------------------

struct RandomChitchatRule {
    services: Arc<Services>,
}

#[async_trait]
impl Rule for RandomChitchatRule {
    fn name(&self) -> &'static str {
        "random_chitchat"
    }

    fn matches(&self, ctx: &EventContext) -> bool {
        ctx.is_message_event
            && ctx.message_type == "group"
            && !ctx.is_mentioned
            && !ctx.text.is_empty()
    }

    async fn run(&self, ctx: &mut EventContext) -> anyhow::Result<bool> {
        let chance = self.services.settings(ctx).random_reply_chance;
        if chance == 0 {
            return Ok(false);
        }
        if chance > 1 && rand::thread_rng().gen_range(0..chance) != 0 {
            return Ok(false);
        }
        info!(group = ?ctx.group_id, "random chitchat triggered");
        let question = ctx.text.clone();
        let answer = memory_chat(&self.services, ctx, &question, "chitchat", CHITCHAT_HISTORY).await;
        self.services.send_reply(ctx, answer);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_matcher() {
        assert!(is_command("查看记忆"));
        assert!(is_command("昵称=小鱼"));
        assert!(is_command("自述=程序员"));
        assert!(is_command("记忆关"));
        assert!(!is_command("查看记忆吧"));
        assert!(!is_command("你好"));
    }
}
