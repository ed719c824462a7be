//! Core types for Scribe.

pub mod edit;
pub mod message;
pub mod problem;
pub mod stream;

pub use edit::*;
pub use message::*;
pub use problem::*;
pub use stream::*;
