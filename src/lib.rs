//! Scribe: streaming edit-protocol engine
//!
//! Turns a language model's token stream into a validated set of codebase
//! edits. The model interleaves prose with a small tag grammar
//! (`<write>`, `<rename>`, `<delete>`, ...); Scribe accumulates the stream
//! into a live transcript, keeps reasoning output from being read as
//! protocol, survives cancellation, resumes truncated writes and runs a
//! bounded auto-fix loop against an in-memory overlay of the app. Nothing is
//! written to disk: the caller commits the returned edits.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use scribe::prelude::*;
//!
//! # async fn example(client: Arc<dyn ModelClient>) -> scribe::error::Result<()> {
//! let orchestrator = Orchestrator::new(EngineConfig::load()?, client);
//! let request = EpisodeRequest::new(1, "/path/to/app", vec![ChatMessage::user("Add a button")]);
//! match orchestrator.run(request).await {
//!     EpisodeOutcome::Completed(done) => println!("{} files to write", done.edits.writes.len()),
//!     EpisodeOutcome::Cancelled { content } => println!("partial: {content}"),
//!     EpisodeOutcome::Failed { error } => eprintln!("{error}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod episode;
pub mod error;
pub mod overlay;
pub mod prelude;
pub mod protocol;
pub mod types;
