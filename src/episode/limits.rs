use std::collections::HashMap;

use crate::config::EngineConfig;

const CONTINUATION_MAX_ATTEMPTS_KEYS: [&str; 2] =
    ["continuation.max_attempts", "max_continuation_attempts"];
const AUTO_FIX_MAX_ATTEMPTS_KEYS: [&str; 2] = ["auto_fix.max_attempts", "max_auto_fix_attempts"];
const MAX_CHAT_TURNS_KEYS: [&str; 2] = ["history.max_chat_turns", "max_chat_turns_in_context"];

/// Retry bounds for one episode. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeLimits {
    pub max_continuation_attempts: usize,
    pub max_auto_fix_attempts: usize,
    pub max_chat_turns_in_context: usize,
}

impl EpisodeLimits {
    /// Request metadata overrides the engine configuration.
    pub fn resolve(config: &EngineConfig, metadata: &HashMap<String, String>) -> Self {
        Self {
            max_continuation_attempts: parse_limit(
                metadata,
                &CONTINUATION_MAX_ATTEMPTS_KEYS,
                config.max_continuation_attempts,
            ),
            max_auto_fix_attempts: parse_limit(
                metadata,
                &AUTO_FIX_MAX_ATTEMPTS_KEYS,
                config.max_auto_fix_attempts,
            ),
            max_chat_turns_in_context: parse_limit(
                metadata,
                &MAX_CHAT_TURNS_KEYS,
                config.max_chat_turns_in_context,
            ),
        }
    }
}

fn parse_limit(metadata: &HashMap<String, String>, keys: &[&str], default: usize) -> usize {
    for key in keys {
        if let Some(value) = metadata.get(*key) {
            if let Some(parsed) = parse_positive_usize(value) {
                return parsed;
            }
            tracing::warn!(key, value = %value, "ignoring invalid episode limit override");
        }
    }
    default
}

fn parse_positive_usize(value: &str) -> Option<usize> {
    let parsed = value.trim().parse::<usize>().ok()?;
    if parsed == 0 {
        None
    } else {
        Some(parsed)
    }
}
