//! Message history preparation: windowing, tag stripping, codebase prefix.

use crate::config::ChatMode;
use crate::protocol::{remove_non_essential_tags, remove_protocol_tags};
use crate::types::{ChatMessage, Role};

/// First words of the leading codebase context message.
pub const CODEBASE_PROMPT_PREFIX: &str = "This is my codebase.";
/// Assistant reply that follows the codebase context message.
pub const CODEBASE_ACKNOWLEDGEMENT: &str = "OK, got it. I'm ready to help";

pub fn codebase_prompt(codebase: &str) -> String {
    format!("{CODEBASE_PROMPT_PREFIX} {codebase}")
}

/// Keep the most recent `max_turns + 1` user/assistant pairs.
///
/// The current prompt counts as a turn. System messages are dropped once the
/// window applies, and the window always starts with a user message.
pub fn limit_history(messages: &[ChatMessage], max_turns: usize) -> Vec<ChatMessage> {
    let max_messages = (max_turns + 1) * 2;
    if messages.len() <= max_messages {
        return messages.to_vec();
    }

    let recent: Vec<&ChatMessage> = messages
        .iter()
        .filter(|message| message.role != Role::System)
        .collect();
    let recent = &recent[recent.len().saturating_sub(max_messages)..];
    let limited: Vec<ChatMessage> = match recent.iter().position(|m| m.role == Role::User) {
        Some(first_user) => recent[first_user..].iter().map(|m| (*m).clone()).collect(),
        None => {
            tracing::warn!("no user messages in recent history, dropping it");
            Vec::new()
        }
    };
    tracing::debug!(
        from = messages.len(),
        to = limited.len(),
        max_turns = max_turns + 1,
        "limiting chat history"
    );
    limited
}

/// Strip reasoning and problem-report blocks, plus every protocol block in
/// ask mode.
pub fn strip_history(messages: Vec<ChatMessage>, mode: ChatMode) -> Vec<ChatMessage> {
    messages
        .into_iter()
        .map(|message| {
            let essential = remove_non_essential_tags(&message.content);
            let content = match mode {
                ChatMode::Ask => remove_protocol_tags(&essential),
                ChatMode::Build => essential,
            };
            ChatMessage {
                role: message.role,
                content,
            }
        })
        .collect()
}

/// Prepend the codebase context pair.
pub fn with_codebase_prefix(codebase: &str, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::user(codebase_prompt(codebase)));
    messages.push(ChatMessage::assistant(CODEBASE_ACKNOWLEDGEMENT));
    messages.extend(history);
    messages
}

/// Replace a leading codebase context message with a fresh rendering.
pub fn refresh_codebase_prefix(history: &[ChatMessage], codebase: &str) -> Vec<ChatMessage> {
    history
        .iter()
        .enumerate()
        .map(|(index, message)| {
            if index == 0
                && message.role == Role::User
                && message.content.starts_with(CODEBASE_PROMPT_PREFIX)
            {
                ChatMessage::user(codebase_prompt(codebase))
            } else {
                message.clone()
            }
        })
        .collect()
}
