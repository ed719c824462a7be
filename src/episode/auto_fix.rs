//! Bounded self-correction: analyze the hypothetical post-edit state and ask
//! the model to fix what the analyzer reports.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::control::TranscriptHook;
use super::history::refresh_codebase_prefix;
use super::stream_phase::{apply_chunk, process_stream_chunks, ReasoningPolicy};
use crate::client::{
    AnalysisRequest, CodebaseContext, ModelClient, ModelRequest, ProblemAnalyzer,
};
use crate::error::{Result, ScribeError};
use crate::overlay::{FileSource, VirtualFileSystem};
use crate::protocol::{
    extract_edits, problem_fix_prompt, remove_non_essential_tags, render_problem_report,
};
use crate::types::{ChatMessage, ProblemReport};

/// Result of the auto-fix loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoFixOutcome {
    /// Fix requests sent to the model.
    pub attempts: usize,
    /// Last known problems; empty when everything was fixed.
    pub remaining_problems: ProblemReport,
    /// The loop stopped early on an analyzer, overlay or model failure.
    pub aborted: bool,
}

pub(crate) struct AutoFixArgs<'a> {
    pub(crate) client: &'a dyn ModelClient,
    pub(crate) analyzer: &'a dyn ProblemAnalyzer,
    pub(crate) codebase: Option<&'a dyn CodebaseContext>,
    pub(crate) file_source: Arc<dyn FileSource>,
    pub(crate) app_root: &'a Path,
    pub(crate) system_prompt: Option<&'a str>,
    pub(crate) history: &'a [ChatMessage],
    pub(crate) transcript: &'a mut String,
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) hook: &'a dyn TranscriptHook,
    pub(crate) max_attempts: usize,
}

/// Run the loop. Failures are logged and end the loop; they never propagate,
/// and the transcript keeps every delta applied before the failure.
pub(crate) async fn run_auto_fix(args: AutoFixArgs<'_>) -> AutoFixOutcome {
    let mut outcome = AutoFixOutcome::default();
    match auto_fix_loop(args, &mut outcome).await {
        Ok(()) => {}
        Err(ScribeError::Cancelled) => {
            tracing::debug!(attempts = outcome.attempts, "auto-fix cancelled while analyzing");
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                attempts = outcome.attempts,
                "error generating problem report or auto-fixing"
            );
            outcome.aborted = true;
        }
    }
    outcome
}

async fn auto_fix_loop(args: AutoFixArgs<'_>, outcome: &mut AutoFixOutcome) -> Result<()> {
    let AutoFixArgs {
        client,
        analyzer,
        codebase,
        file_source,
        app_root,
        system_prompt,
        history,
        transcript,
        cancel,
        hook,
        max_attempts,
    } = args;

    let original_response = remove_non_essential_tags(transcript);
    let mut previous_attempts: Vec<ChatMessage> = Vec::new();

    let mut report = analyze(analyzer, &file_source, app_root, transcript, cancel).await?;
    outcome.remaining_problems = report.clone();

    while !report.is_empty() && outcome.attempts < max_attempts && !cancel.is_cancelled() {
        apply_chunk(transcript, &render_problem_report(&report), hook);
        outcome.attempts += 1;
        tracing::info!(
            attempt = outcome.attempts,
            problems = report.len(),
            "attempting to auto-fix problems"
        );

        let fix_prompt = problem_fix_prompt(&report);
        let overlay = build_overlay(&file_source, app_root, transcript);
        let mut messages = match codebase {
            Some(codebase) => {
                let rendered = codebase.render(app_root, Some(&overlay)).await?;
                refresh_codebase_prefix(history, &rendered)
            }
            None => history.to_vec(),
        };
        messages.push(ChatMessage::assistant(original_response.clone()));
        messages.extend(previous_attempts.iter().cloned());
        messages.push(ChatMessage::user(fix_prompt.clone()));

        if cancel.is_cancelled() {
            break;
        }
        let request = ModelRequest::new(system_prompt.map(str::to_string), messages);
        let stream = client.stream(request, cancel.clone()).await?;
        previous_attempts.push(ChatMessage::user(fix_prompt));
        let streamed =
            process_stream_chunks(stream, transcript, cancel, hook, ReasoningPolicy::Bracket)
                .await?;
        previous_attempts.push(ChatMessage::assistant(remove_non_essential_tags(
            &streamed.incremental,
        )));
        if streamed.stopped_by_cancel {
            break;
        }

        report = analyze(analyzer, &file_source, app_root, transcript, cancel).await?;
        outcome.remaining_problems = report.clone();
    }

    if !report.is_empty() && outcome.attempts >= max_attempts {
        tracing::warn!(
            attempts = outcome.attempts,
            problems = report.len(),
            "problems remain after auto-fix limit"
        );
    }
    Ok(())
}

fn build_overlay(
    file_source: &Arc<dyn FileSource>,
    app_root: &Path,
    transcript: &str,
) -> VirtualFileSystem {
    let mut overlay = VirtualFileSystem::new(app_root, Arc::clone(file_source));
    overlay.apply_changes(&extract_edits(transcript));
    overlay
}

async fn analyze(
    analyzer: &dyn ProblemAnalyzer,
    file_source: &Arc<dyn FileSource>,
    app_root: &Path,
    transcript: &str,
    cancel: &CancellationToken,
) -> Result<ProblemReport> {
    let overlay = build_overlay(file_source, app_root, transcript);
    let analysis = analyzer.problem_report(AnalysisRequest {
        transcript,
        app_root,
        overlay: &overlay,
    });
    let report = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ScribeError::Cancelled),
        report = analysis => report?,
    };
    tracing::debug!(problems = report.len(), "problem report");
    Ok(report)
}
