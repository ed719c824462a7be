//! Tag extraction: pure functions from a transcript to structured records.
//!
//! Matching is left-to-right and non-overlapping. Tag names are
//! case-insensitive and attributes may appear in any order. Body-less tags
//! (`rename`, `delete`, `add-dependency`, `command`) are recognized by their
//! opening tag alone, so a bare, self-closing or explicitly closed form all
//! parse the same way. Body-less tags that sit inside a `write` or
//! `execute-sql` body are file content, not protocol, and are ignored, as is
//! anything inside a reasoning block.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::path::normalize_path;
use super::TagKind;
use crate::types::{ExecuteSql, Rename, ResponseEdits, WriteFile};

/// Attribute list of an opening tag. Quoted values may contain `>` and `/`.
const ATTRIBUTES: &str = r#"((?:\s(?:[^>"/]|/[^>"]|"[^"]*")*)?)"#;

static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#)
        .expect("attribute regex must compile")
});

static TAG_PATTERNS: LazyLock<HashMap<TagKind, Regex>> = LazyLock::new(|| {
    TagKind::ALL
        .iter()
        .map(|kind| {
            let name = regex::escape(kind.name());
            let pattern = if kind.requires_body() {
                format!(r"(?is)<{name}{ATTRIBUTES}>(.*?)</{name}\s*>")
            } else {
                format!(r"(?i)<{name}{ATTRIBUTES}/?>")
            };
            let regex = Regex::new(&pattern).expect("tag regex must compile");
            (*kind, regex)
        })
        .collect()
});

static WRITE_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)<write{ATTRIBUTES}>")).expect("write-open regex must compile")
});

static REASONING_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?(?:</think>|\z)").expect("reasoning block regex must compile")
});

static WRITE_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</write\s*>").expect("write-close regex must compile"));

/// One raw tag occurrence.
#[derive(Debug, Clone)]
pub(crate) struct TagMatch {
    pub(crate) span: Range<usize>,
    pub(crate) attributes: HashMap<String, String>,
    pub(crate) body: Option<String>,
}

impl TagMatch {
    pub(crate) fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn raw<'a>(&self, transcript: &'a str) -> &'a str {
        &transcript[self.span.clone()]
    }
}

/// All occurrences of `kind` in `transcript`, in order.
pub(crate) fn tag_matches(transcript: &str, kind: TagKind) -> Vec<TagMatch> {
    let regex = &TAG_PATTERNS[&kind];
    let matches = regex.captures_iter(transcript).filter_map(|caps| {
        let whole = caps.get(0)?;
        let attributes = caps
            .get(1)
            .map(|attrs| parse_attributes(attrs.as_str()))
            .unwrap_or_default();
        Some(TagMatch {
            span: whole.range(),
            attributes,
            body: caps.get(2).map(|body| body.as_str().to_string()),
        })
    });

    let mut excluded = reasoning_spans(transcript);
    if !kind.requires_body() {
        excluded.extend(content_body_spans(transcript));
    }
    matches
        .filter(|m| !excluded.iter().any(|span| span.contains(&m.span.start)))
        .collect()
}

fn reasoning_spans(transcript: &str) -> Vec<Range<usize>> {
    REASONING_BLOCK_RE
        .find_iter(transcript)
        .map(|m| m.range())
        .collect()
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTRIBUTE_RE
        .captures_iter(raw)
        .map(|caps| (caps[1].to_ascii_lowercase(), caps[2].to_string()))
        .collect()
}

/// Byte ranges of `write` and `execute-sql` matches, whose bodies are content.
fn content_body_spans(transcript: &str) -> Vec<Range<usize>> {
    [TagKind::Write, TagKind::ExecuteSql]
        .into_iter()
        .flat_map(|kind| TAG_PATTERNS[&kind].find_iter(transcript).map(|m| m.range()))
        .collect()
}

/// Trim a body and drop a leading and/or trailing markdown fence line.
pub(crate) fn strip_code_fence(body: &str) -> String {
    let mut lines: Vec<&str> = body.trim().split('\n').collect();
    if lines.first().is_some_and(|line| line.starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|line| line.starts_with("```")) {
        lines.pop();
    }
    lines.join("\n")
}

/// `<write>` records. Tags without a `path` are skipped with a warning.
pub fn write_tags(transcript: &str) -> Vec<WriteFile> {
    tag_matches(transcript, TagKind::Write)
        .into_iter()
        .filter_map(|m| {
            let Some(path) = m.attribute("path") else {
                tracing::warn!(tag = %m.raw(transcript), "found <write> tag without a valid 'path' attribute");
                return None;
            };
            Some(WriteFile {
                path: normalize_path(path),
                content: strip_code_fence(m.body.as_deref().unwrap_or_default()),
                description: m.attribute("description").map(str::to_string),
            })
        })
        .collect()
}

/// `<rename>` records. Both `from` and `to` are required.
pub fn rename_tags(transcript: &str) -> Vec<Rename> {
    tag_matches(transcript, TagKind::Rename)
        .into_iter()
        .filter_map(|m| match (m.attribute("from"), m.attribute("to")) {
            (Some(from), Some(to)) => Some(Rename {
                from: normalize_path(from),
                to: normalize_path(to),
            }),
            _ => {
                tracing::warn!(tag = %m.raw(transcript), "skipping malformed <rename> tag");
                None
            }
        })
        .collect()
}

/// Paths named by `<delete>` tags.
pub fn delete_tags(transcript: &str) -> Vec<String> {
    tag_matches(transcript, TagKind::Delete)
        .into_iter()
        .filter_map(|m| match m.attribute("path") {
            Some(path) => Some(normalize_path(path)),
            None => {
                tracing::warn!(tag = %m.raw(transcript), "skipping <delete> tag without 'path'");
                None
            }
        })
        .collect()
}

/// Package tokens from every `<add-dependency packages="..">` tag.
pub fn add_dependency_tags(transcript: &str) -> Vec<String> {
    tag_matches(transcript, TagKind::AddDependency)
        .into_iter()
        .flat_map(|m| match m.attribute("packages") {
            Some(packages) => packages
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>(),
            None => {
                tracing::warn!(tag = %m.raw(transcript), "skipping <add-dependency> tag without 'packages'");
                Vec::new()
            }
        })
        .collect()
}

/// `<execute-sql>` records, fence-stripped like write bodies.
pub fn execute_sql_tags(transcript: &str) -> Vec<ExecuteSql> {
    tag_matches(transcript, TagKind::ExecuteSql)
        .into_iter()
        .map(|m| ExecuteSql {
            content: strip_code_fence(m.body.as_deref().unwrap_or_default()),
            description: m.attribute("description").map(str::to_string),
        })
        .collect()
}

/// `type` values of `<command>` tags.
pub fn command_tags(transcript: &str) -> Vec<String> {
    tag_matches(transcript, TagKind::Command)
        .into_iter()
        .filter_map(|m| m.attribute("type").map(str::to_string))
        .collect()
}

/// Trimmed text of the first `<chat-summary>`; `None` when absent or blank.
pub fn chat_summary_tag(transcript: &str) -> Option<String> {
    let first = tag_matches(transcript, TagKind::ChatSummary).into_iter().next()?;
    let text = first.body?.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Whether the last `<write ..>` opening tag has no `</write>` after it.
pub fn has_unclosed_write(transcript: &str) -> bool {
    let reasoning = reasoning_spans(transcript);
    let Some(last_open) = WRITE_OPEN_RE
        .find_iter(transcript)
        .filter(|m| !reasoning.iter().any(|span| span.contains(&m.start())))
        .last()
    else {
        return false;
    };
    !WRITE_CLOSE_RE.is_match(&transcript[last_open.end()..])
}

/// Run every extractor over one transcript.
pub fn extract_edits(transcript: &str) -> ResponseEdits {
    ResponseEdits {
        writes: write_tags(transcript),
        renames: rename_tags(transcript),
        deletes: delete_tags(transcript),
        dependencies: add_dependency_tags(transcript),
        sql: execute_sql_tags(transcript),
        commands: command_tags(transcript),
        chat_summary: chat_summary_tag(transcript),
    }
}
