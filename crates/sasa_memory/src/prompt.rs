//! Prompt assembly: turn memory state into the system context and chat
//! history fed to the text provider.

use sasa_ai::llm::ChatMessage;
use sasa_core::emotion::{EmotionLabel, UserEmotion};
use sasa_core::BotAffect;

use crate::manager::UserSummary;
use crate::models::{Personality, Relation, StmRole, StmTurn, UserRecord};

fn personality_phrase(p: &Personality) -> String {
    let mut traits = Vec::new();
    if p.talkative > 0.65 {
        traits.push("话比较多");
    } else if p.talkative < 0.35 {
        traits.push("话不多");
    }
    if p.optimism > 0.65 {
        traits.push("心态乐观");
    } else if p.optimism < 0.35 {
        traits.push("容易消极");
    }
    if p.stability > 0.65 {
        traits.push("情绪稳定");
    } else if p.stability < 0.35 {
        traits.push("情绪起伏大");
    }
    if p.politeness > 0.65 {
        traits.push("说话客气");
    } else if p.politeness < 0.35 {
        traits.push("说话直接");
    }
    if traits.is_empty() {
        "性格还在了解中".to_string()
    } else {
        traits.join("、")
    }
}

fn relation_phrase(r: &Relation) -> &'static str {
    if r.familiarity > 0.7 {
        "你们已经非常熟了，可以随意开玩笑"
    } else if r.familiarity > 0.4 {
        "你们比较熟，说话可以放松些"
    } else if r.familiarity > 0.15 {
        "你们认识但不算熟，保持友好"
    } else {
        "你们还不太熟，注意分寸"
    }
}

fn emotion_guide(e: &UserEmotion) -> &'static str {
    match e.label {
        EmotionLabel::Happy => "对方心情不错，可以一起开心",
        EmotionLabel::Sad => "对方有点难过，语气温柔一些，适当安慰",
        EmotionLabel::Angry => "对方在生气，别火上浇油，先顺着说",
        EmotionLabel::Fear => "对方有点害怕，给点安全感",
        EmotionLabel::Disgust => "对方很反感什么东西，别提那个话题",
        EmotionLabel::Surprise => "对方很惊讶，可以一起凑热闹",
        EmotionLabel::Calm => "对方很平静，正常聊就好",
        EmotionLabel::Neutral => "对方情绪平常，正常聊就好",
    }
}

/// Assemble the full system prompt: persona, who the user is, what the bot
/// remembers, and how to behave this turn.
pub fn build_system_context(
    record: &UserRecord,
    user_emotion: &UserEmotion,
    bot_affect: &BotAffect,
    base_prompt: &str,
) -> String {
    let mut out = String::from(base_prompt);

    out.push_str("\n\n【当前对话对象】\n");
    if record.profile.nickname.is_empty() {
        out.push_str("- 对方没告诉过你怎么称呼\n");
    } else {
        out.push_str(&format!("- 称呼对方为「{}」\n", record.profile.nickname));
    }
    for desc in &record.profile.self_descriptions {
        out.push_str(&format!("- 对方自述：{}\n", desc));
    }
    out.push_str(&format!("- 性格印象：{}\n", personality_phrase(&record.personality)));
    out.push_str(&format!("- 关系：{}\n", relation_phrase(&record.relation)));

    if !record.long_term_memory.is_empty() {
        let mut ltm = record.long_term_memory.clone();
        ltm.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        out.push_str("\n【你记住的重要事情】\n");
        for entry in ltm.iter().take(5) {
            out.push_str(&format!("- {}\n", entry.text));
        }
    }

    out.push_str("\n【本轮行为指导】\n");
    out.push_str(&format!("- {}\n", emotion_guide(user_emotion)));
    out.push_str(&format!("- 你现在的状态偏「{}」，语气与之匹配\n", bot_affect.suggested_tone()));

    out
}

/// Convert STM turns plus the current question into provider chat messages.
/// History is bounded to the most recent `max_history` turns; the question is
/// appended unless it is already the last user turn (the caller may have
/// recorded it into STM first).
pub fn build_chat_messages(
    stm: &[StmTurn],
    question: &str,
    system_prompt: &str,
    max_history: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];

    let start = stm.len().saturating_sub(max_history);
    for turn in &stm[start..] {
        match turn.role {
            StmRole::User => messages.push(ChatMessage::user(&turn.text)),
            StmRole::Assistant => messages.push(ChatMessage::assistant(&turn.text)),
        }
    }

    let already_last = stm
        .last()
        .map(|t| t.role == StmRole::User && t.text == question)
        .unwrap_or(false);
    if !already_last {
        messages.push(ChatMessage::user(question));
    }

    messages
}

/// Instruction for the personality estimate: strict JSON, four traits.
pub fn build_personality_prompt(recent_messages: &[String]) -> String {
    let mut out = String::from(
        "根据下面这位用户最近的聊天记录，估计ta的性格。只输出一个JSON对象，\
         不要输出其他任何文字，格式：\
         {\"talkative\":0.5,\"optimism\":0.5,\"stability\":0.5,\"politeness\":0.5}，\
         每个值在0到1之间。\n\n聊天记录：\n",
    );
    for msg in recent_messages {
        out.push_str(&format!("- {}\n", msg));
    }
    out
}

/// Render a memory digest for the 查看记忆 command.
pub fn format_memory_summary(summary: &UserSummary) -> String {
    let mut out = String::from("我对你的印象：\n");
    if summary.nickname.is_empty() {
        out.push_str("- 称呼：还没告诉我呢\n");
    } else {
        out.push_str(&format!("- 称呼：{}\n", summary.nickname));
    }
    for desc in &summary.self_descriptions {
        out.push_str(&format!("- 自述：{}\n", desc));
    }
    out.push_str(&format!(
        "- 聊过 {} 条消息，最近记着 {} 条\n",
        summary.total_msgs, summary.stm_turns
    ));
    out.push_str(&format!(
        "- 熟悉度 {:.2}，信任度 {:.2}\n",
        summary.familiarity, summary.trust
    ));
    if summary.ltm_entries.is_empty() {
        out.push_str("- 还没记住什么特别的事情\n");
    } else {
        out.push_str("- 记住的事情：\n");
        for entry in summary.ltm_entries.iter().take(5) {
            out.push_str(&format!("  · {}\n", entry.text));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LtmEntry, StmMeta};
    use sasa_ai::llm::Role;

    fn turn(role: StmRole, text: &str) -> StmTurn {
        StmTurn::new(role, text, StmMeta::default())
    }

    #[test]
    fn test_system_context_sections() {
        let mut record = UserRecord::new("1");
        record.profile.nickname = "小鱼".to_string();
        record.long_term_memory.push(LtmEntry {
            text: "生日是三月三号".to_string(),
            ts: 0,
            importance: 0.8,
            meta: StmMeta::default(),
        });

        let ctx = build_system_context(
            &record,
            &UserEmotion::new(EmotionLabel::Sad, 0.7, 0.8),
            &BotAffect::default(),
            "你是鲨鲨。",
        );
        assert!(ctx.starts_with("你是鲨鲨。"));
        assert!(ctx.contains("【当前对话对象】"));
        assert!(ctx.contains("小鱼"));
        assert!(ctx.contains("【你记住的重要事情】"));
        assert!(ctx.contains("生日是三月三号"));
        assert!(ctx.contains("【本轮行为指导】"));
        assert!(ctx.contains("安慰"));
    }

    #[test]
    fn test_ltm_section_top5_by_importance() {
        let mut record = UserRecord::new("1");
        for i in 0..8 {
            record.long_term_memory.push(LtmEntry {
                text: format!("事情{}", i),
                ts: 0,
                importance: i as f32 / 10.0,
                meta: StmMeta::default(),
            });
        }
        let ctx = build_system_context(
            &record,
            &UserEmotion::neutral(),
            &BotAffect::default(),
            "",
        );
        assert!(ctx.contains("事情7"));
        assert!(!ctx.contains("事情0"), "low-importance entries are omitted");
    }

    #[test]
    fn test_chat_messages_bounded_history() {
        let stm: Vec<StmTurn> = (0..10)
            .map(|i| turn(StmRole::User, &format!("m{}", i)))
            .collect();
        let messages = build_chat_messages(&stm, "现在呢", "sys", 4);
        // system + 4 history + question
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "m6");
        assert_eq!(messages.last().unwrap().content, "现在呢");
    }

    #[test]
    fn test_question_not_duplicated_when_already_recorded() {
        let stm = vec![
            turn(StmRole::Assistant, "哼"),
            turn(StmRole::User, "在吗"),
        ];
        let messages = build_chat_messages(&stm, "在吗", "sys", 10);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages.last().unwrap().content, "在吗");
    }

    #[test]
    fn test_empty_stm_still_asks() {
        let messages = build_chat_messages(&[], "你好", "sys", 10);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "你好");
    }

    #[test]
    fn test_personality_prompt_lists_messages() {
        let prompt = build_personality_prompt(&["你好".to_string(), "哈哈".to_string()]);
        assert!(prompt.contains("JSON"));
        assert!(prompt.contains("- 你好"));
        assert!(prompt.contains("- 哈哈"));
    }

    #[test]
    fn test_memory_summary_render() {
        let summary = UserSummary {
            nickname: "小鱼".to_string(),
            self_descriptions: vec!["程序员".to_string()],
            total_msgs: 42,
            stm_turns: 7,
            ltm_entries: vec![],
            familiarity: 0.35,
            trust: 0.5,
        };
        let text = format_memory_summary(&summary);
        assert!(text.contains("小鱼"));
        assert!(text.contains("42"));
        assert!(text.contains("还没记住什么特别的事情"));
    }
}
