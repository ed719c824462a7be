//! Convenience re-exports for common use.

pub use crate::client::{
    AnalysisRequest, CodebaseContext, DeltaStream, ModelClient, ModelRequest, ProblemAnalyzer,
};
pub use crate::config::{ChatMode, EngineConfig};
pub use crate::episode::{
    channel_sink, CompletedEpisode, ConversationId, EpisodeEvent, EpisodeEventPayload,
    EpisodeEventSink, EpisodeOutcome, EpisodeRequest, EpisodeStatus, Orchestrator,
};
pub use crate::error::{Result, ScribeError};
pub use crate::overlay::{FileSource, TokioFileSource, VirtualFileSystem};
pub use crate::types::{
    ChatMessage, Problem, ProblemReport, ResponseEdits, Role, StreamDelta, StructuredEdit,
};
