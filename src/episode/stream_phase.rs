//! Stream chunk processing: deltas in, one growing transcript out.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::control::TranscriptHook;
use crate::client::DeltaStream;
use crate::error::Result;
use crate::protocol::{clean_attribute_values, escape_protocol_tags, THINK_CLOSE, THINK_OPEN};
use crate::types::StreamDelta;

/// What to do with reasoning deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningPolicy {
    /// Bracket reasoning runs with `<think>`/`</think>`, sanitized.
    Bracket,
    /// Drop reasoning deltas entirely.
    Ignore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunkOutcome {
    /// Text appended by this call, before hook rewrites.
    pub incremental: String,
    /// Consumption stopped because the token fired.
    pub stopped_by_cancel: bool,
}

/// Consume `stream` into `transcript`, running `hook` after every applied
/// delta.
///
/// On `Err` the transcript keeps everything applied before the failure. A
/// stream error observed after cancellation is treated as the cancellation.
pub async fn process_stream_chunks(
    mut stream: DeltaStream,
    transcript: &mut String,
    cancel: &CancellationToken,
    hook: &dyn TranscriptHook,
    reasoning: ReasoningPolicy,
) -> Result<StreamChunkOutcome> {
    let mut outcome = StreamChunkOutcome::default();
    let mut in_reasoning = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.stopped_by_cancel = true;
                break;
            }
            next = stream.next() => next,
        };
        let Some(item) = next else {
            break;
        };
        let delta = match item {
            Ok(delta) => delta,
            Err(_) if cancel.is_cancelled() => {
                outcome.stopped_by_cancel = true;
                break;
            }
            Err(err) => return Err(err),
        };

        let mut chunk = String::new();
        match delta {
            StreamDelta::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                if in_reasoning {
                    chunk.push_str(THINK_CLOSE);
                    in_reasoning = false;
                }
                chunk.push_str(&text);
            }
            StreamDelta::Reasoning(text) => {
                if text.is_empty() || reasoning == ReasoningPolicy::Ignore {
                    continue;
                }
                if !in_reasoning {
                    chunk.push_str(THINK_OPEN);
                    in_reasoning = true;
                }
                chunk.push_str(&escape_protocol_tags(&text));
            }
        }

        apply_chunk(transcript, &chunk, hook);
        outcome.incremental.push_str(&chunk);

        if cancel.is_cancelled() {
            outcome.stopped_by_cancel = true;
            break;
        }
    }

    if in_reasoning && !outcome.stopped_by_cancel {
        apply_chunk(transcript, THINK_CLOSE, hook);
        outcome.incremental.push_str(THINK_CLOSE);
    }
    Ok(outcome)
}

/// Append, clean attribute values and hand the result to the hook.
pub(crate) fn apply_chunk(transcript: &mut String, chunk: &str, hook: &dyn TranscriptHook) {
    transcript.push_str(chunk);
    let cleaned = clean_attribute_values(transcript);
    *transcript = hook.on_update(cleaned);
}
