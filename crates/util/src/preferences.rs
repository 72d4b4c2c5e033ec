//! User preference persistence for the knit CLI.
//!
//! A small JSON-backed store for defaults the command line falls back to when
//! a flag is not given: wrap width, color choice, truncation ellipsis,
//! duration style and URL normalization switches. The file lives in the
//! standard configuration directory (`~/.config/knit/preferences.json` on
//! most platforms) and may be shared between threads thanks to the internal
//! `Mutex`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ansi::{ColorLevel, Stream, color_level};
use crate::expand_tilde;
use crate::url_normalize::NormalizeOptions;

/// Environment variable allowing callers to override the preferences file path.
pub const PREFERENCES_PATH_ENV: &str = "KNIT_PREFERENCES_PATH";

/// Default filename for the JSON payload.
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Error surfaced when reading or writing preferences fails.
#[derive(Debug, Error)]
pub enum PreferencesError {
    /// I/O failure (for example, permissions or missing directory).
    #[error("preferences I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("preferences serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unknown color choice `{0}`; expected auto, always or never")]
    UnknownColorChoice(String),
}

/// Whether styled output is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    /// Follow terminal detection.
    #[default]
    Auto,
    /// Color even when detection says no, at least the 16 basic colors.
    Always,
    Never,
}

impl ColorChoice {
    /// Color level to render `stream` with under this choice.
    pub fn resolve(self, stream: Stream) -> ColorLevel {
        match self {
            ColorChoice::Auto => color_level(stream),
            ColorChoice::Always => color_level(stream).max(ColorLevel::Basic),
            ColorChoice::Never => ColorLevel::None,
        }
    }
}

impl FromStr for ColorChoice {
    type Err = PreferencesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            other => Err(PreferencesError::UnknownColorChoice(other.to_string())),
        }
    }
}

/// Persisted preference values. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Column count used by `wrap` when none is given.
    pub wrap_width: Option<usize>,
    pub color: ColorChoice,
    /// Marker inserted by `truncate`.
    pub ellipsis: String,
    /// Render durations with only their largest unit.
    pub compact_durations: bool,
    pub normalize: NormalizeOptions,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            wrap_width: None,
            color: ColorChoice::Auto,
            ellipsis: "…".to_string(),
            compact_durations: false,
            normalize: NormalizeOptions::default(),
        }
    }
}

/// Thread-safe preferences store backed by a JSON file.
#[derive(Debug, Default)]
pub struct UserPreferences {
    path: PathBuf,
    payload: Mutex<Preferences>,
    persist_to_disk: bool,
}

impl UserPreferences {
    /// Loads the store from `KNIT_PREFERENCES_PATH` or the default config
    /// directory path.
    pub fn new() -> Result<Self, PreferencesError> {
        Self::load_from(default_preferences_path())
    }

    /// Loads the store from an explicit file. A missing file yields defaults.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, PreferencesError> {
        let path = path.into();
        let payload = load_payload(&path)?;
        Ok(Self {
            path,
            payload: Mutex::new(payload),
            persist_to_disk: true,
        })
    }

    /// Build an in-memory store used as a fallback when the config directory cannot be accessed.
    pub fn ephemeral() -> Self {
        Self {
            path: PathBuf::new(),
            payload: Mutex::new(Preferences::default()),
            persist_to_disk: false,
        }
    }

    /// Path to the underlying JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the current values.
    pub fn snapshot(&self) -> Preferences {
        self.lock().clone()
    }

    /// Applies `change` and persists the result.
    pub fn update<F>(&self, change: F) -> Result<(), PreferencesError>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut payload = self.lock();
        change(&mut payload);
        if self.persist_to_disk {
            self.save_locked(&payload)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Preferences> {
        self.payload.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save_locked(&self, payload: &Preferences) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(payload)?;
        fs::write(&self.path, data)?;
        debug!(path = %self.path.display(), "saved preferences");
        Ok(())
    }
}

fn default_preferences_path() -> PathBuf {
    if let Ok(path) = env::var(PREFERENCES_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("knit")
        .join(PREFERENCES_FILE_NAME)
}

fn load_payload(path: &Path) -> Result<Preferences, PreferencesError> {
    match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(payload) => Ok(payload),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to parse preferences file; using defaults"
                );
                Ok(Preferences::default())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Preferences::default()),
        Err(error) => Err(PreferencesError::Io(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = UserPreferences::load_from(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.snapshot(), Preferences::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(PREFERENCES_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        let store = UserPreferences::load_from(&path).unwrap();
        assert_eq!(store.snapshot(), Preferences::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(PREFERENCES_FILE_NAME);
        fs::write(&path, r#"{ "color": "never", "normalize": { "strip_www": false } }"#).unwrap();

        let preferences = UserPreferences::load_from(&path).unwrap().snapshot();
        assert_eq!(preferences.color, ColorChoice::Never);
        assert_eq!(preferences.ellipsis, "…");
        assert!(!preferences.normalize.strip_www);
        assert!(preferences.normalize.sort_query_parameters);
    }

    #[test]
    fn update_persists_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(PREFERENCES_FILE_NAME);
        let store = UserPreferences::load_from(&path).unwrap();
        store
            .update(|preferences| {
                preferences.wrap_width = Some(72);
                preferences.compact_durations = true;
            })
            .unwrap();

        let reloaded = UserPreferences::load_from(&path).unwrap().snapshot();
        assert_eq!(reloaded.wrap_width, Some(72));
        assert!(reloaded.compact_durations);
    }

    #[test]
    fn ephemeral_store_never_writes() {
        let store = UserPreferences::ephemeral();
        store.update(|preferences| preferences.ellipsis = "...".to_string()).unwrap();
        assert_eq!(store.snapshot().ellipsis, "...");
        assert_eq!(store.path(), Path::new(""));
    }

    #[test]
    fn env_override_selects_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.json");
        temp_env::with_var(PREFERENCES_PATH_ENV, Some(path.as_os_str()), || {
            assert_eq!(default_preferences_path(), path);
        });
    }

    #[test]
    fn color_choice_parsing_and_resolution() {
        assert_eq!("Always".parse::<ColorChoice>().unwrap(), ColorChoice::Always);
        assert!("sometimes".parse::<ColorChoice>().is_err());
        assert_eq!(ColorChoice::Never.resolve(Stream::Stdout), ColorLevel::None);
        assert!(ColorChoice::Always.resolve(Stream::Stderr) >= ColorLevel::Basic);
    }
}
