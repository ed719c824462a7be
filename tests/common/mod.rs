//! Shared test helpers and scripted collaborators.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use scribe::client::{
    AnalysisRequest, CodebaseContext, DeltaStream, ModelClient, ModelRequest, ProblemAnalyzer,
};
use scribe::episode::EpisodeEvent;
use scribe::error::{Result, ScribeError};
use scribe::overlay::{FileSource, VirtualFileSystem};
use scribe::types::{Problem, ProblemReport, StreamDelta};

pub const APP_ROOT: &str = "/app";

/// One scripted model invocation.
pub enum Script {
    /// Yield the deltas, then end.
    Deltas(Vec<StreamDelta>),
    /// Yield the deltas, then fail the stream.
    FailAfter(Vec<StreamDelta>, String),
    /// `stream()` itself fails.
    Refuse(String),
    /// Yield the deltas, then never end.
    Hang(Vec<StreamDelta>),
}

/// A model client that replays queued scripts and records every request.
#[derive(Default)]
pub struct ScriptedModelClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelClient {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn stream(
        &self,
        request: ModelRequest,
        _cancel: CancellationToken,
    ) -> Result<DeltaStream> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Deltas(Vec::new()));

        let stream: DeltaStream = match script {
            Script::Deltas(deltas) => futures::stream::iter(deltas.into_iter().map(Ok::<_, ScribeError>)).boxed(),
            Script::FailAfter(deltas, message) => async_stream::stream! {
                for delta in deltas {
                    yield Ok(delta);
                }
                yield Err(ScribeError::Stream(message));
            }
            .boxed(),
            Script::Refuse(message) => return Err(ScribeError::model_client(message)),
            Script::Hang(deltas) => async_stream::stream! {
                for delta in deltas {
                    yield Ok::<_, ScribeError>(delta);
                }
                futures::future::pending::<()>().await;
            }
            .boxed(),
        };
        Ok(stream)
    }
}

/// What the analyzer saw on one call.
#[derive(Debug, Clone)]
pub struct AnalysisCall {
    pub transcript: String,
    pub pending_writes: Vec<String>,
    pub deleted: Vec<String>,
}

/// An analyzer that replays queued results; an empty queue reports no problems.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    results: Mutex<VecDeque<Result<ProblemReport>>>,
    calls: Mutex<Vec<AnalysisCall>>,
}

impl ScriptedAnalyzer {
    pub fn new(results: Vec<Result<ProblemReport>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<AnalysisCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProblemAnalyzer for ScriptedAnalyzer {
    async fn problem_report(&self, request: AnalysisRequest<'_>) -> Result<ProblemReport> {
        self.calls.lock().unwrap().push(AnalysisCall {
            transcript: request.transcript.to_string(),
            pending_writes: request
                .overlay
                .pending_writes()
                .into_iter()
                .map(str::to_string)
                .collect(),
            deleted: request
                .overlay
                .deleted_paths()
                .into_iter()
                .map(str::to_string)
                .collect(),
        });
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ProblemReport::default()))
    }
}

/// An analyzer that never answers; `entered` fires once it is awaited.
#[derive(Default)]
pub struct StalledAnalyzer {
    pub entered: Notify,
}

#[async_trait]
impl ProblemAnalyzer for StalledAnalyzer {
    async fn problem_report(&self, _request: AnalysisRequest<'_>) -> Result<ProblemReport> {
        self.entered.notify_one();
        futures::future::pending::<Result<ProblemReport>>().await
    }
}

/// In-memory stand-in for the real filesystem.
#[derive(Default)]
pub struct MemoryFileSource {
    files: HashMap<PathBuf, String>,
}

impl MemoryFileSource {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(path, content)| (Path::new(APP_ROOT).join(path), content.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl FileSource for MemoryFileSource {
    async fn file_exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ScribeError::overlay(path.display().to_string(), "no such file"))
    }
}

/// Codebase renderer listing the overlay's pending writes.
pub struct StaticCodebase;

#[async_trait]
impl CodebaseContext for StaticCodebase {
    async fn render(
        &self,
        _app_root: &Path,
        overlay: Option<&VirtualFileSystem>,
    ) -> Result<String> {
        Ok(match overlay {
            Some(overlay) => format!("files with pending: {}", overlay.pending_writes().join(",")),
            None => "files".to_string(),
        })
    }
}

/// Renders immediately without an overlay; with one, signals `entered` and
/// waits for `release`.
#[derive(Default)]
pub struct GatedCodebase {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl CodebaseContext for GatedCodebase {
    async fn render(
        &self,
        _app_root: &Path,
        overlay: Option<&VirtualFileSystem>,
    ) -> Result<String> {
        if overlay.is_some() {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok("files".to_string())
    }
}

pub fn problem(file: &str, line: u32, message: &str) -> Problem {
    Problem {
        file: file.to_string(),
        line,
        column: 1,
        code: "2304".to_string(),
        message: message.to_string(),
    }
}

pub fn text(text: &str) -> StreamDelta {
    StreamDelta::text(text)
}

pub fn reasoning(text: &str) -> StreamDelta {
    StreamDelta::reasoning(text)
}

/// Drain events already delivered to a channel sink.
pub fn drain_events(
    events: &mut tokio_stream::wrappers::UnboundedReceiverStream<EpisodeEvent>,
) -> Vec<EpisodeEvent> {
    let mut out = Vec::new();
    while let Some(Some(event)) = futures::FutureExt::now_or_never(events.next()) {
        out.push(event);
    }
    out
}
