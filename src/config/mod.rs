//! Configuration system (layered: code > env > config file > defaults).

use std::fs;
use std::path::{Path, PathBuf};

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, ScribeError};

/// Default bound on continuation round-trips for a truncated write.
pub const DEFAULT_MAX_CONTINUATION_ATTEMPTS: usize = 2;
/// Default bound on auto-fix iterations.
pub const DEFAULT_MAX_AUTO_FIX_ATTEMPTS: usize = 2;
/// Default number of prior chat turns replayed to the model.
pub const DEFAULT_MAX_CHAT_TURNS_IN_CONTEXT: usize = 5;
/// Suffix appended to the partial transcript of a cancelled episode.
pub const DEFAULT_CANCELLATION_NOTICE: &str = "[Response cancelled by user]";

const CONFIG_FILE_NAME: &str = "scribe.toml";

const ENV_CHAT_MODE: &str = "SCRIBE_CHAT_MODE";
const ENV_AUTO_FIX: &str = "SCRIBE_AUTO_FIX";
const ENV_MAX_CONTINUATION_ATTEMPTS: &str = "SCRIBE_MAX_CONTINUATION_ATTEMPTS";
const ENV_MAX_AUTO_FIX_ATTEMPTS: &str = "SCRIBE_MAX_AUTO_FIX_ATTEMPTS";
const ENV_MAX_CHAT_TURNS: &str = "SCRIBE_MAX_CHAT_TURNS";

/// Which kind of turn the user asked for.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChatMode {
    /// The model may propose edits.
    #[default]
    Build,
    /// Read-only: no continuation, no auto-fix, protocol tags stripped from history.
    Ask,
}

impl ChatMode {
    pub fn permits_edits(self) -> bool {
        matches!(self, Self::Build)
    }
}

/// Engine-wide policy settings.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[builder(default)]
    pub chat_mode: ChatMode,
    #[builder(default = true)]
    pub enable_auto_fix_problems: bool,
    #[builder(default = DEFAULT_MAX_CONTINUATION_ATTEMPTS)]
    pub max_continuation_attempts: usize,
    #[builder(default = DEFAULT_MAX_AUTO_FIX_ATTEMPTS)]
    pub max_auto_fix_attempts: usize,
    #[builder(default = DEFAULT_MAX_CHAT_TURNS_IN_CONTEXT)]
    pub max_chat_turns_in_context: usize,
    #[builder(default = DEFAULT_CANCELLATION_NOTICE.to_string())]
    pub cancellation_notice: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EngineConfig {
    /// Load from the default config file (if present) and the environment.
    ///
    /// A `.env` file in the working directory is honored.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults overlaid with environment variables only.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok());
        config
    }

    /// Defaults overlaid with a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overlaid with TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: EngineConfigFile = toml::from_str(raw)?;
        let mut config = Self::default();
        file.merge_into(&mut config)?;
        Ok(config)
    }

    /// Overlay values from an environment-like lookup.
    ///
    /// Unparseable or zero bounds are ignored and leave the current value.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_CHAT_MODE) {
            match raw.trim().parse::<ChatMode>() {
                Ok(mode) => self.chat_mode = mode,
                Err(_) => tracing::warn!(value = %raw, "ignoring unknown {ENV_CHAT_MODE}"),
            }
        }
        if let Some(raw) = lookup(ENV_AUTO_FIX) {
            match parse_bool(&raw) {
                Some(enabled) => self.enable_auto_fix_problems = enabled,
                None => tracing::warn!(value = %raw, "ignoring invalid {ENV_AUTO_FIX}"),
            }
        }
        if let Some(value) = lookup(ENV_MAX_CONTINUATION_ATTEMPTS).and_then(|v| parse_bound(&v)) {
            self.max_continuation_attempts = value;
        }
        if let Some(value) = lookup(ENV_MAX_AUTO_FIX_ATTEMPTS).and_then(|v| parse_bound(&v)) {
            self.max_auto_fix_attempts = value;
        }
        if let Some(value) = lookup(ENV_MAX_CHAT_TURNS).and_then(|v| parse_bound(&v)) {
            self.max_chat_turns_in_context = value;
        }
    }
}

/// `<config dir>/scribe.toml` for the current user, if a home directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "scribe", "scribe")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EngineConfigFile {
    #[serde(default)]
    chat_mode: Option<ChatMode>,
    #[serde(default)]
    enable_auto_fix_problems: Option<bool>,
    #[serde(default)]
    max_continuation_attempts: Option<usize>,
    #[serde(default)]
    max_auto_fix_attempts: Option<usize>,
    #[serde(default)]
    max_chat_turns_in_context: Option<usize>,
    #[serde(default)]
    cancellation_notice: Option<String>,
}

impl EngineConfigFile {
    fn merge_into(self, config: &mut EngineConfig) -> Result<()> {
        if let Some(mode) = self.chat_mode {
            config.chat_mode = mode;
        }
        if let Some(enabled) = self.enable_auto_fix_problems {
            config.enable_auto_fix_problems = enabled;
        }
        if let Some(value) = self.max_continuation_attempts {
            config.max_continuation_attempts = positive("max_continuation_attempts", value)?;
        }
        if let Some(value) = self.max_auto_fix_attempts {
            config.max_auto_fix_attempts = positive("max_auto_fix_attempts", value)?;
        }
        if let Some(value) = self.max_chat_turns_in_context {
            config.max_chat_turns_in_context = positive("max_chat_turns_in_context", value)?;
        }
        if let Some(notice) = self.cancellation_notice {
            config.cancellation_notice = notice;
        }
        Ok(())
    }
}

fn positive(field: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(ScribeError::Configuration(format!(
            "{field} must be a positive integer"
        )));
    }
    Ok(value)
}

fn parse_bound(raw: &str) -> Option<usize> {
    let parsed = raw.trim().parse::<usize>().ok()?;
    (parsed > 0).then_some(parsed)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
