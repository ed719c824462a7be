//! Episode identifiers, lifecycle phases and outcomes.

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::types::{ProblemReport, ResponseEdits};

/// Caller-assigned conversation identifier.
pub type ConversationId = u64;
/// Unique identifier of one episode.
pub type EpisodeId = Uuid;

/// Terminal status of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EpisodeStatus {
    Completed,
    Cancelled,
    Failed,
}

/// Lifecycle phase of a running episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EpisodePhase {
    Started,
    Streaming,
    StructurallyComplete,
    ContinuationPending,
    AutoFixPending,
    Cancelled,
    Failed,
    Finalized,
}

impl EpisodePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Finalized)
    }

    pub fn can_transition_to(self, next: EpisodePhase) -> bool {
        use EpisodePhase::*;
        match (self, next) {
            (Started, Streaming | Failed | Cancelled) => true,
            (Streaming, StructurallyComplete | Cancelled | Failed) => true,
            (StructurallyComplete, ContinuationPending | AutoFixPending | Finalized) => true,
            (StructurallyComplete, Cancelled) => true,
            (ContinuationPending, StructurallyComplete | Cancelled) => true,
            (AutoFixPending, StructurallyComplete | Cancelled) => true,
            _ => false,
        }
    }
}

/// Phase tracker that records the path an episode took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeState {
    phase: EpisodePhase,
    trail: Vec<EpisodePhase>,
}

impl Default for EpisodeState {
    fn default() -> Self {
        Self {
            phase: EpisodePhase::Started,
            trail: vec![EpisodePhase::Started],
        }
    }
}

impl EpisodeState {
    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    /// Every phase entered so far, in order.
    pub fn trail(&self) -> &[EpisodePhase] {
        &self.trail
    }

    pub(crate) fn advance(&mut self, next: EpisodePhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal episode transition {} -> {next}",
            self.phase
        );
        tracing::trace!(from = %self.phase, to = %next, "episode phase");
        self.phase = next;
        self.trail.push(next);
    }
}

/// Result of an episode that reached structural completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedEpisode {
    /// Final transcript, including any embedded problem-report blocks.
    pub content: String,
    /// First `chat-summary` tag, a title candidate for the chat.
    pub chat_summary: Option<String>,
    /// Every record extracted from the final transcript.
    pub edits: ResponseEdits,
    pub continuation_attempts: usize,
    pub auto_fix_attempts: usize,
    /// Problems still present after the last auto-fix iteration.
    pub remaining_problems: ProblemReport,
}

/// How an episode ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Completed(CompletedEpisode),
    /// Last checkpointed transcript with the cancellation notice appended.
    Cancelled { content: String },
    Failed { error: String },
}

impl EpisodeOutcome {
    pub fn status(&self) -> EpisodeStatus {
        match self {
            Self::Completed(_) => EpisodeStatus::Completed,
            Self::Cancelled { .. } => EpisodeStatus::Cancelled,
            Self::Failed { .. } => EpisodeStatus::Failed,
        }
    }

    /// Content to persist for the assistant message, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Completed(done) => Some(&done.content),
            Self::Cancelled { content } => Some(content),
            Self::Failed { .. } => None,
        }
    }
}
