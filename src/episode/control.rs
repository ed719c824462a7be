//! Observer events and the checkpoint hook that publishes them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::registry::EpisodeRegistration;
use super::types::{ConversationId, EpisodeId, EpisodeStatus};

/// Event payloads published while an episode runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EpisodeEventPayload {
    Started,
    /// Full transcript as of this point.
    Checkpoint {
        transcript: String,
    },
    /// User-visible error. Emitted at most once per episode.
    Error {
        message: String,
    },
    Finished {
        status: EpisodeStatus,
    },
}

/// Envelope for episode events. `seq` increases by one per event within an
/// episode, so observers can drop re-delivered events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeEvent {
    pub conversation_id: ConversationId,
    pub episode_id: EpisodeId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EpisodeEventPayload,
}

/// Sink receiving episode events. Must not block.
pub type EpisodeEventSink = Arc<dyn Fn(EpisodeEvent) + Send + Sync>;

/// A sink feeding an unbounded channel, and the stream draining it.
pub fn channel_sink() -> (EpisodeEventSink, UnboundedReceiverStream<EpisodeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: EpisodeEventSink = Arc::new(move |event: EpisodeEvent| {
        // A dropped receiver just means nobody is watching.
        let _ = tx.send(event);
    });
    (sink, UnboundedReceiverStream::new(rx))
}

pub(crate) struct EpisodeEventEmitter {
    conversation_id: ConversationId,
    episode_id: EpisodeId,
    seq: AtomicU64,
    sink: Option<EpisodeEventSink>,
}

impl EpisodeEventEmitter {
    pub(crate) fn new(
        conversation_id: ConversationId,
        episode_id: EpisodeId,
        sink: Option<EpisodeEventSink>,
    ) -> Self {
        Self {
            conversation_id,
            episode_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: EpisodeEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(EpisodeEvent {
            conversation_id: self.conversation_id,
            episode_id: self.episode_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}

/// Called with the transcript after every applied delta; the returned value
/// replaces the transcript.
pub trait TranscriptHook: Send + Sync {
    fn on_update(&self, transcript: String) -> String;
}

impl<F> TranscriptHook for F
where
    F: Fn(String) -> String + Send + Sync,
{
    fn on_update(&self, transcript: String) -> String {
        self(transcript)
    }
}

/// Substitutes placeholders, records the partial and publishes a checkpoint.
pub(crate) struct CheckpointHook<'a> {
    pub(crate) emitter: &'a EpisodeEventEmitter,
    pub(crate) registration: &'a EpisodeRegistration,
    pub(crate) placeholders: &'a [(String, String)],
}

impl TranscriptHook for CheckpointHook<'_> {
    fn on_update(&self, mut transcript: String) -> String {
        for (placeholder, replacement) in self.placeholders {
            if let Some(start) = transcript.find(placeholder.as_str()) {
                transcript.replace_range(start..start + placeholder.len(), replacement);
            }
        }
        self.registration.record_checkpoint(&transcript);
        self.emitter.emit(EpisodeEventPayload::Checkpoint {
            transcript: transcript.clone(),
        });
        transcript
    }
}
