//! Episode orchestration: one chat turn from first delta to final transcript.
//!
//! ```text
//! Started -> Streaming -> {Cancelled | StructurallyComplete}
//! StructurallyComplete -> ContinuationPending -> StructurallyComplete
//! StructurallyComplete -> AutoFixPending -> StructurallyComplete
//! StructurallyComplete -> Finalized
//! ```

pub mod auto_fix;
pub mod continuation;
pub mod control;
pub mod history;
pub mod limits;
pub mod registry;
pub mod stream_phase;
pub mod types;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

pub use auto_fix::AutoFixOutcome;
pub use continuation::ContinuationOutcome;
pub use control::{
    channel_sink, EpisodeEvent, EpisodeEventPayload, EpisodeEventSink, TranscriptHook,
};
pub use limits::EpisodeLimits;
pub use registry::{EpisodeRegistration, EpisodeRegistry};
pub use stream_phase::{process_stream_chunks, ReasoningPolicy, StreamChunkOutcome};
pub use types::{
    CompletedEpisode, ConversationId, EpisodeId, EpisodeOutcome, EpisodePhase, EpisodeState,
    EpisodeStatus,
};

use self::auto_fix::{run_auto_fix, AutoFixArgs};
use self::continuation::{run_continuation, ContinuationArgs};
use self::control::{CheckpointHook, EpisodeEventEmitter};
use self::history::{limit_history, strip_history, with_codebase_prefix};
use crate::client::{CodebaseContext, ModelClient, ModelRequest, ProblemAnalyzer};
use crate::config::{ChatMode, EngineConfig};
use crate::error::ScribeError;
use crate::overlay::{FileSource, TokioFileSource};
use crate::protocol::{add_dependency_tags, extract_edits, has_unclosed_write};
use crate::types::ChatMessage;

/// Prefix of the user-visible error event for model failures.
pub const MODEL_ERROR_PREFIX: &str = "Sorry, there was an error from the AI:";

/// Request payload to start an episode.
#[derive(Clone)]
pub struct EpisodeRequest {
    pub conversation_id: ConversationId,
    /// Root of the app whose files the edits target.
    pub app_root: PathBuf,
    pub system_prompt: Option<String>,
    /// Prior conversation, ending with the current user prompt.
    pub messages: Vec<ChatMessage>,
    /// Overrides the configured chat mode.
    pub chat_mode: Option<ChatMode>,
    /// Placeholder -> replacement pairs applied at every checkpoint.
    pub placeholders: Vec<(String, String)>,
    /// Per-episode limit overrides, e.g. `auto_fix.max_attempts`.
    pub metadata: HashMap<String, String>,
    pub event_sink: Option<EpisodeEventSink>,
}

impl EpisodeRequest {
    pub fn new(
        conversation_id: ConversationId,
        app_root: impl Into<PathBuf>,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            conversation_id,
            app_root: app_root.into(),
            system_prompt: None,
            messages,
            chat_mode: None,
            placeholders: Vec::new(),
            metadata: HashMap::new(),
            event_sink: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_chat_mode(mut self, mode: ChatMode) -> Self {
        self.chat_mode = Some(mode);
        self
    }

    pub fn with_placeholder(
        mut self,
        placeholder: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.placeholders
            .push((placeholder.into(), replacement.into()));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_event_sink(mut self, sink: EpisodeEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }
}

/// Process-wide episode driver. Owns the live-episode registry.
///
/// Create one at startup, call [`shutdown`](Self::shutdown) on teardown.
/// Clones share the registry and collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<EngineConfig>,
    registry: EpisodeRegistry,
    client: Arc<dyn ModelClient>,
    analyzer: Option<Arc<dyn ProblemAnalyzer>>,
    codebase: Option<Arc<dyn CodebaseContext>>,
    file_source: Arc<dyn FileSource>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, client: Arc<dyn ModelClient>) -> Self {
        Self {
            config: Arc::new(config),
            registry: EpisodeRegistry::new(),
            client,
            analyzer: None,
            codebase: None,
            file_source: Arc::new(TokioFileSource),
        }
    }

    /// Enables the auto-fix loop (subject to configuration).
    pub fn with_analyzer(mut self, analyzer: Arc<dyn ProblemAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_codebase(mut self, codebase: Arc<dyn CodebaseContext>) -> Self {
        self.codebase = Some(codebase);
        self
    }

    pub fn with_file_source(mut self, file_source: Arc<dyn FileSource>) -> Self {
        self.file_source = file_source;
        self
    }

    pub fn with_registry(mut self, registry: EpisodeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &EpisodeRegistry {
        &self.registry
    }

    /// Cancel the live episode of a conversation. `false` if none is live.
    pub fn cancel(&self, conversation_id: ConversationId) -> bool {
        self.registry.cancel(conversation_id)
    }

    /// Cancel every live episode. Returns how many were cancelled.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        tracing::info!(cancelled, "orchestrator shut down");
        cancelled
    }

    /// Run one episode to a terminal state.
    pub async fn run(&self, request: EpisodeRequest) -> EpisodeOutcome {
        let registration = self.registry.register(request.conversation_id);
        self.run_registered(request, registration).await
    }

    /// Register the episode now and drive it on a tokio task, so a
    /// [`cancel`](Self::cancel) issued right after this call is honored.
    pub fn spawn(&self, request: EpisodeRequest) -> JoinHandle<EpisodeOutcome> {
        let registration = self.registry.register(request.conversation_id);
        let this = self.clone();
        tokio::spawn(async move { this.run_registered(request, registration).await })
    }

    async fn run_registered(
        &self,
        request: EpisodeRequest,
        registration: EpisodeRegistration,
    ) -> EpisodeOutcome {
        let emitter = EpisodeEventEmitter::new(
            request.conversation_id,
            registration.episode_id(),
            request.event_sink.clone(),
        );
        let outcome = {
            let hook = CheckpointHook {
                emitter: &emitter,
                registration: &registration,
                placeholders: &request.placeholders,
            };
            let mut driver = EpisodeDriver {
                orchestrator: self,
                request: &request,
                registration: &registration,
                emitter: &emitter,
                hook: &hook,
                state: EpisodeState::default(),
                transcript: String::new(),
            };
            driver.drive().await
        };
        drop(registration);
        emitter.emit(EpisodeEventPayload::Finished {
            status: outcome.status(),
        });
        outcome
    }
}

/// Per-episode working state.
struct EpisodeDriver<'a> {
    orchestrator: &'a Orchestrator,
    request: &'a EpisodeRequest,
    registration: &'a EpisodeRegistration,
    emitter: &'a EpisodeEventEmitter,
    hook: &'a CheckpointHook<'a>,
    state: EpisodeState,
    transcript: String,
}

impl EpisodeDriver<'_> {
    async fn drive(&mut self) -> EpisodeOutcome {
        let orchestrator = self.orchestrator;
        let request = self.request;
        let config = orchestrator.config.as_ref();
        let mode = request.chat_mode.unwrap_or(config.chat_mode);
        let limits = EpisodeLimits::resolve(config, &request.metadata);
        let cancel = self.registration.token().clone();
        let system_prompt = request.system_prompt.as_deref();

        self.emitter.emit(EpisodeEventPayload::Started);
        tracing::info!(
            conversation_id = request.conversation_id,
            episode_id = %self.registration.episode_id(),
            mode = %mode,
            "episode started"
        );

        let history = self.prepare_history(mode, &limits).await;

        self.state.advance(EpisodePhase::Streaming);
        let streamed = match orchestrator
            .client
            .stream(
                ModelRequest::new(request.system_prompt.clone(), history.clone()),
                cancel.clone(),
            )
            .await
        {
            Ok(stream) => {
                process_stream_chunks(
                    stream,
                    &mut self.transcript,
                    &cancel,
                    self.hook,
                    ReasoningPolicy::Bracket,
                )
                .await
            }
            Err(err) => Err(err),
        };
        match streamed {
            Ok(_) if cancel.is_cancelled() => return self.cancelled(),
            Ok(_) => {}
            Err(_) if cancel.is_cancelled() => return self.cancelled(),
            Err(err) => return self.failed(err),
        }
        self.state.advance(EpisodePhase::StructurallyComplete);

        let mut continuation_attempts = 0;
        if mode.permits_edits() && has_unclosed_write(&self.transcript) {
            self.state.advance(EpisodePhase::ContinuationPending);
            let continued = run_continuation(ContinuationArgs {
                client: orchestrator.client.as_ref(),
                system_prompt,
                history: &history,
                transcript: &mut self.transcript,
                cancel: &cancel,
                hook: self.hook,
                max_attempts: limits.max_continuation_attempts,
            })
            .await;
            if cancel.is_cancelled() {
                return self.cancelled();
            }
            continuation_attempts = continued.attempts;
            if let Some(err) = continued.error {
                tracing::error!(
                    conversation_id = request.conversation_id,
                    attempts = continuation_attempts,
                    error = %err,
                    "continuation failed, keeping the response so far"
                );
                self.emit_model_error(&err);
            }
            self.state.advance(EpisodePhase::StructurallyComplete);
        }

        let mut auto_fix = AutoFixOutcome::default();
        if self.should_auto_fix(mode) {
            if let Some(analyzer) = orchestrator.analyzer.as_deref() {
                self.state.advance(EpisodePhase::AutoFixPending);
                auto_fix = run_auto_fix(AutoFixArgs {
                    client: orchestrator.client.as_ref(),
                    analyzer,
                    codebase: orchestrator.codebase.as_deref(),
                    file_source: Arc::clone(&orchestrator.file_source),
                    app_root: &request.app_root,
                    system_prompt,
                    history: &history,
                    transcript: &mut self.transcript,
                    cancel: &cancel,
                    hook: self.hook,
                    max_attempts: limits.max_auto_fix_attempts,
                })
                .await;
                if cancel.is_cancelled() {
                    return self.cancelled();
                }
                self.state.advance(EpisodePhase::StructurallyComplete);
            } else {
                tracing::debug!("no problem analyzer configured, skipping auto-fix");
            }
        }

        if cancel.is_cancelled() {
            return self.cancelled();
        }
        self.state.advance(EpisodePhase::Finalized);

        let content = std::mem::take(&mut self.transcript);
        let edits = extract_edits(&content);
        tracing::info!(
            conversation_id = request.conversation_id,
            continuation_attempts,
            auto_fix_attempts = auto_fix.attempts,
            remaining_problems = auto_fix.remaining_problems.len(),
            "episode completed"
        );
        EpisodeOutcome::Completed(CompletedEpisode {
            chat_summary: edits.chat_summary.clone(),
            content,
            edits,
            continuation_attempts,
            auto_fix_attempts: auto_fix.attempts,
            remaining_problems: auto_fix.remaining_problems,
        })
    }

    fn should_auto_fix(&self, mode: ChatMode) -> bool {
        if !mode.permits_edits() || !self.orchestrator.config.enable_auto_fix_problems {
            return false;
        }
        // New packages are not installed yet, so analyzer errors are expected.
        let dependencies = add_dependency_tags(&self.transcript);
        if !dependencies.is_empty() {
            tracing::debug!(?dependencies, "response adds dependencies, skipping auto-fix");
            return false;
        }
        true
    }

    async fn prepare_history(&self, mode: ChatMode, limits: &EpisodeLimits) -> Vec<ChatMessage> {
        let limited = limit_history(&self.request.messages, limits.max_chat_turns_in_context);
        let history = strip_history(limited, mode);
        let Some(codebase) = self.orchestrator.codebase.as_deref() else {
            return history;
        };
        match codebase.render(&self.request.app_root, None).await {
            Ok(rendered) => with_codebase_prefix(&rendered, history),
            Err(err) => {
                tracing::warn!(error = %err, "failed to render codebase context, continuing without it");
                history
            }
        }
    }

    fn cancelled(&mut self) -> EpisodeOutcome {
        self.state.advance(EpisodePhase::Cancelled);
        let content = self.registration.finalize_cancelled(
            &self.orchestrator.config.cancellation_notice,
            &self.transcript,
        );
        tracing::info!(
            conversation_id = self.request.conversation_id,
            "episode cancelled, keeping partial response"
        );
        self.emitter.emit(EpisodeEventPayload::Checkpoint {
            transcript: content.clone(),
        });
        EpisodeOutcome::Cancelled { content }
    }

    fn failed(&mut self, err: ScribeError) -> EpisodeOutcome {
        self.state.advance(EpisodePhase::Failed);
        tracing::error!(
            conversation_id = self.request.conversation_id,
            error = %err,
            "episode failed"
        );
        self.emit_model_error(&err);
        EpisodeOutcome::Failed {
            error: err.to_string(),
        }
    }

    fn emit_model_error(&self, err: &ScribeError) {
        self.emitter.emit(EpisodeEventPayload::Error {
            message: format!("{MODEL_ERROR_PREFIX} {err}"),
        });
    }
}
