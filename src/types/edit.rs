//! Structured edit records extracted from a transcript.
//!
//! Records are immutable snapshots: every extraction pass builds a fresh
//! [`ResponseEdits`].

use serde::{Deserialize, Serialize};

/// `<write path=".." description="..">body</write>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `<rename from=".." to="..">`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

/// `<execute-sql description="..">body</execute-sql>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteSql {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One parsed tag instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredEdit {
    WriteFile(WriteFile),
    Rename(Rename),
    Delete { path: String },
    AddDependency { packages: Vec<String> },
    ExecuteSql(ExecuteSql),
    Command { command_type: String },
    ChatSummary { text: String },
}

/// Every record found in one transcript, grouped by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseEdits {
    pub writes: Vec<WriteFile>,
    pub renames: Vec<Rename>,
    pub deletes: Vec<String>,
    pub dependencies: Vec<String>,
    pub sql: Vec<ExecuteSql>,
    pub commands: Vec<String>,
    pub chat_summary: Option<String>,
}

impl ResponseEdits {
    /// Whether the response touches files (write, rename or delete).
    pub fn has_file_changes(&self) -> bool {
        !self.writes.is_empty() || !self.renames.is_empty() || !self.deletes.is_empty()
    }

    /// Flatten into individual records in kind order.
    pub fn records(&self) -> Vec<StructuredEdit> {
        let mut out = Vec::new();
        out.extend(self.writes.iter().cloned().map(StructuredEdit::WriteFile));
        out.extend(self.renames.iter().cloned().map(StructuredEdit::Rename));
        out.extend(
            self.deletes
                .iter()
                .map(|path| StructuredEdit::Delete { path: path.clone() }),
        );
        if !self.dependencies.is_empty() {
            out.push(StructuredEdit::AddDependency {
                packages: self.dependencies.clone(),
            });
        }
        out.extend(self.sql.iter().cloned().map(StructuredEdit::ExecuteSql));
        out.extend(self.commands.iter().map(|command_type| StructuredEdit::Command {
            command_type: command_type.clone(),
        }));
        if let Some(text) = &self.chat_summary {
            out.push(StructuredEdit::ChatSummary { text: text.clone() });
        }
        out
    }
}
