//! Collaborator seams: the model client, the problem analyzer and the
//! codebase context renderer. Concrete implementations live with the
//! embedding application.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::overlay::VirtualFileSystem;
use crate::types::{ChatMessage, ProblemReport, StreamDelta};

/// Ordered content deltas. An `Err` item ends the stream as a failure.
pub type DeltaStream = BoxStream<'static, Result<StreamDelta>>;

/// One model invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl ModelRequest {
    pub fn new(system_prompt: Option<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system_prompt,
            messages,
        }
    }
}

/// Streaming language-model client.
///
/// `stream` should return promptly; generation happens as the stream is
/// polled. Implementations should stop producing once `cancel` fires.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream(&self, request: ModelRequest, cancel: CancellationToken)
        -> Result<DeltaStream>;
}

/// Input to a problem analysis pass.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub transcript: &'a str,
    pub app_root: &'a Path,
    /// Hypothetical file state the problems are computed against.
    pub overlay: &'a VirtualFileSystem,
}

/// Static analyzer producing problem reports (e.g. a type checker).
#[async_trait]
pub trait ProblemAnalyzer: Send + Sync {
    async fn problem_report(&self, request: AnalysisRequest<'_>) -> Result<ProblemReport>;
}

/// Renders the codebase for the leading context message.
#[async_trait]
pub trait CodebaseContext: Send + Sync {
    /// With an overlay, pending edits must be reflected in the output.
    async fn render(
        &self,
        app_root: &Path,
        overlay: Option<&VirtualFileSystem>,
    ) -> Result<String>;
}
