//! Overlay filesystem view: pending edits applied in memory over a real tree.
//!
//! The view is queried by path only. Nothing here ever writes to disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, ScribeError};
use crate::protocol::normalize_path;
use crate::types::ResponseEdits;

/// Read access to the underlying (real) filesystem.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn file_exists(&self, path: &Path) -> bool;

    async fn read_file(&self, path: &Path) -> Result<String>;
}

/// [`FileSource`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSource;

#[async_trait]
impl FileSource for TokioFileSource {
    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

/// Where an overlay path gets its content from.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Pending(String),
    Underlying(String),
    Missing,
}

/// A read-through projection of `root` with pending edits applied.
#[derive(Clone)]
pub struct VirtualFileSystem {
    root: PathBuf,
    source: Arc<dyn FileSource>,
    files: HashMap<String, String>,
    deleted: HashSet<String>,
    /// Renamed path -> path of the underlying file it reads from.
    redirects: HashMap<String, String>,
}

impl std::fmt::Debug for VirtualFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileSystem")
            .field("root", &self.root)
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("deleted", &self.deleted)
            .field("redirects", &self.redirects)
            .finish()
    }
}

impl VirtualFileSystem {
    pub fn new(root: impl Into<PathBuf>, source: Arc<dyn FileSource>) -> Self {
        Self {
            root: root.into(),
            source,
            files: HashMap::new(),
            deleted: HashSet::new(),
            redirects: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply deletes, then renames, then writes. Only the overlay changes.
    pub fn apply_changes(&mut self, edits: &ResponseEdits) {
        for path in &edits.deletes {
            let key = self.key(path);
            self.files.remove(&key);
            self.redirects.remove(&key);
            self.deleted.insert(key);
        }

        for rename in &edits.renames {
            let from = self.key(&rename.from);
            let to = self.key(&rename.to);
            if from == to {
                continue;
            }
            self.redirects.remove(&to);
            if let Some(content) = self.files.remove(&from) {
                self.files.insert(to.clone(), content);
            } else if !self.deleted.contains(&from) {
                let origin = self.redirects.remove(&from).unwrap_or_else(|| from.clone());
                self.redirects.insert(to.clone(), origin);
            }
            self.redirects.remove(&from);
            self.deleted.remove(&to);
            self.deleted.insert(from);
        }

        for write in &edits.writes {
            let key = self.key(&write.path);
            self.deleted.remove(&key);
            self.redirects.remove(&key);
            self.files.insert(key, write.content.clone());
        }
    }

    pub async fn file_exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Resolution::Pending(_) => true,
            Resolution::Underlying(key) => self.source.file_exists(&self.absolute(&key)).await,
            Resolution::Missing => false,
        }
    }

    /// Content of `path` in the overlay; `None` when it does not exist.
    pub async fn read_file(&self, path: &str) -> Result<Option<String>> {
        match self.resolve(path) {
            Resolution::Pending(content) => Ok(Some(content)),
            Resolution::Underlying(key) => {
                let absolute = self.absolute(&key);
                if !self.source.file_exists(&absolute).await {
                    return Ok(None);
                }
                self.source
                    .read_file(&absolute)
                    .await
                    .map(Some)
                    .map_err(|err| ScribeError::overlay(key, err.to_string()))
            }
            Resolution::Missing => Ok(None),
        }
    }

    /// Paths with pending content, sorted.
    pub fn pending_writes(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.files.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Paths hidden by a delete or by being renamed away, sorted.
    pub fn deleted_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.deleted.iter().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    fn resolve(&self, path: &str) -> Resolution {
        let key = self.key(path);
        if let Some(content) = self.files.get(&key) {
            return Resolution::Pending(content.clone());
        }
        if let Some(origin) = self.redirects.get(&key) {
            return Resolution::Underlying(origin.clone());
        }
        if self.deleted.contains(&key) {
            return Resolution::Missing;
        }
        Resolution::Underlying(key)
    }

    /// Root-relative normalized key. Absolute paths under `root` are accepted.
    fn key(&self, path: &str) -> String {
        let candidate = Path::new(path);
        let relative = candidate
            .strip_prefix(&self.root)
            .map(|rest| rest.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string());
        normalize_path(&relative)
            .trim_start_matches('/')
            .to_string()
    }

    fn absolute(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}
