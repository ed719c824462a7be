//! The edit tag protocol: tag vocabulary, extraction, sanitizing and rendering.
//!
//! The model interleaves free-form prose with a small tag grammar:
//!
//! ```text
//! <write path="src/a.ts" description="..">body</write>
//! <rename from="a.ts" to="b.ts"></rename>
//! <delete path="a.ts"></delete>
//! <add-dependency packages="react zod"></add-dependency>
//! <execute-sql description="..">body</execute-sql>
//! <command type="rebuild"></command>
//! <chat-summary>text</chat-summary>
//! ```
//!
//! Attribute values are always double-quoted. Reasoning output is bracketed
//! by [`THINK_OPEN`] / [`THINK_CLOSE`] and never interpreted as protocol.

pub mod path;
pub mod render;
pub mod sanitize;
pub mod tags;

pub use path::normalize_path;
pub use render::{
    escape_xml, parse_problem_reports, problem_fix_prompt, remove_non_essential_tags,
    remove_problem_report_blocks, remove_protocol_tags, remove_thinking_blocks,
    render_problem_report, unescape_xml,
};
pub use sanitize::{clean_attribute_values, escape_protocol_tags};
pub use tags::{
    add_dependency_tags, chat_summary_tag, command_tags, delete_tags, execute_sql_tags,
    extract_edits, has_unclosed_write, rename_tags, write_tags,
};

use strum::{Display, EnumString};

/// Opens a reasoning block in the transcript.
pub const THINK_OPEN: &str = "<think>";
/// Closes a reasoning block in the transcript.
pub const THINK_CLOSE: &str = "</think>";

/// Look-alike substitute for `<` (FULLWIDTH LESS-THAN SIGN).
pub const LOOKALIKE_LT: char = '\u{FF1C}';
/// Look-alike substitute for `>` (FULLWIDTH GREATER-THAN SIGN).
pub const LOOKALIKE_GT: char = '\u{FF1E}';

/// Every tag name the protocol recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum TagKind {
    Write,
    Rename,
    Delete,
    AddDependency,
    ExecuteSql,
    Command,
    ChatSummary,
    ProblemReport,
    Problem,
}

impl TagKind {
    pub const ALL: [TagKind; 9] = [
        TagKind::Write,
        TagKind::Rename,
        TagKind::Delete,
        TagKind::AddDependency,
        TagKind::ExecuteSql,
        TagKind::Command,
        TagKind::ChatSummary,
        TagKind::ProblemReport,
        TagKind::Problem,
    ];

    /// Wire name, e.g. `add-dependency`.
    pub fn name(self) -> &'static str {
        match self {
            TagKind::Write => "write",
            TagKind::Rename => "rename",
            TagKind::Delete => "delete",
            TagKind::AddDependency => "add-dependency",
            TagKind::ExecuteSql => "execute-sql",
            TagKind::Command => "command",
            TagKind::ChatSummary => "chat-summary",
            TagKind::ProblemReport => "problem-report",
            TagKind::Problem => "problem",
        }
    }

    /// Whether the tag carries content between its opening and closing tags.
    ///
    /// Body-less tags may also be written self-closing (`<delete path=".."/>`).
    pub fn requires_body(self) -> bool {
        matches!(
            self,
            TagKind::Write
                | TagKind::ExecuteSql
                | TagKind::ChatSummary
                | TagKind::ProblemReport
                | TagKind::Problem
        )
    }
}
