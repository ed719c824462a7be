//! Resuming a response that stopped inside an unclosed `<write>`.

use tokio_util::sync::CancellationToken;

use super::control::TranscriptHook;
use super::stream_phase::{process_stream_chunks, ReasoningPolicy};
use crate::client::{ModelClient, ModelRequest};
use crate::error::{Result, ScribeError};
use crate::protocol::has_unclosed_write;
use crate::types::ChatMessage;

/// Result of the continuation loop.
#[derive(Debug, Default)]
pub struct ContinuationOutcome {
    /// Continuation requests sent to the model.
    pub attempts: usize,
    /// Model failure that ended the loop early. The transcript keeps every
    /// delta applied before it.
    pub error: Option<ScribeError>,
}

pub(crate) struct ContinuationArgs<'a> {
    pub(crate) client: &'a dyn ModelClient,
    pub(crate) system_prompt: Option<&'a str>,
    pub(crate) history: &'a [ChatMessage],
    pub(crate) transcript: &'a mut String,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) hook: &'a dyn TranscriptHook,
    pub(crate) max_attempts: usize,
}

/// Re-invoke the model with the transcript pre-filled as its own turn while
/// a write stays unclosed.
///
/// Running out of attempts is not an error; the dangling tag is left as is.
/// A model failure ends the loop and is handed back, never raised.
pub(crate) async fn run_continuation(args: ContinuationArgs<'_>) -> ContinuationOutcome {
    let mut outcome = ContinuationOutcome::default();
    if let Err(err) = continuation_loop(args, &mut outcome.attempts).await {
        outcome.error = Some(err);
    }
    outcome
}

async fn continuation_loop(args: ContinuationArgs<'_>, attempts: &mut usize) -> Result<()> {
    let ContinuationArgs {
        client,
        system_prompt,
        history,
        transcript,
        cancel,
        hook,
        max_attempts,
    } = args;

    while *attempts < max_attempts && has_unclosed_write(transcript) {
        if cancel.is_cancelled() {
            return Ok(());
        }
        *attempts += 1;
        tracing::info!(attempt = *attempts, "received unclosed write tag, continuing");

        let mut messages = history.to_vec();
        messages.push(ChatMessage::assistant(transcript.clone()));
        let request = ModelRequest::new(system_prompt.map(str::to_string), messages);
        let stream = client.stream(request, cancel.clone()).await?;
        let streamed =
            process_stream_chunks(stream, transcript, cancel, hook, ReasoningPolicy::Ignore)
                .await?;
        if streamed.stopped_by_cancel {
            return Ok(());
        }
    }

    if *attempts == max_attempts && has_unclosed_write(transcript) {
        tracing::warn!(
            attempts = *attempts,
            "write tag still unclosed after continuation limit"
        );
    }
    Ok(())
}
