use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, RwLock},
};

/// Threshold applied when the stored value is unset or zero.
pub const DEFAULT_THRESHOLD_MINUTES: u32 = 20;

const DEFAULT_MESSAGE: &str = "Time to take a break.";

/// User-facing reminder preferences, persisted as TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Active minutes before a reminder fires. Zero means "use the default".
    #[serde(default = "default_threshold")]
    pub threshold_minutes: u32,
    /// Notification body. An empty string suppresses the notification while
    /// the timer cycle still resets.
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD_MINUTES
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            threshold_minutes: default_threshold(),
            message: default_message(),
        }
    }
}

/// Shared handle to the reminder settings.
///
/// Cloning is cheap; all clones observe the same in-memory state. When a
/// backing path is present, setters persist immediately and [`reload`]
/// picks up changes written by another process.
///
/// [`reload`]: SettingsStore::reload
#[derive(Clone)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    inner: Arc<RwLock<Settings>>,
}

impl SettingsStore {
    /// Open a settings store backed by `path`, loading the file if it
    /// exists. A missing or malformed file falls back to defaults so the
    /// reminder keeps working.
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        let settings = match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Malformed settings file {}: {e}", path.display());
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };

        Self {
            path: Some(path),
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Create an unbacked store, used by tests and embedded hosts.
    #[must_use]
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            path: None,
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Re-read the backing file, replacing in-memory state. A no-op for
    /// unbacked stores or when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        *self.inner.write().unwrap() = settings;
        Ok(())
    }

    /// Copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.inner.read().unwrap().clone()
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.inner.read().unwrap().enabled
    }

    /// Configured threshold with the unset/zero default applied.
    #[must_use]
    pub fn threshold_minutes(&self) -> u32 {
        let value = self.inner.read().unwrap().threshold_minutes;
        if value == 0 {
            DEFAULT_THRESHOLD_MINUTES
        } else {
            value
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.inner.read().unwrap().message.clone()
    }

    /// # Errors
    ///
    /// Returns an error if the settings file cannot be written.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.enabled = enabled)
    }

    /// # Errors
    ///
    /// Returns an error if the settings file cannot be written.
    pub fn set_threshold_minutes(&self, minutes: u32) -> Result<()> {
        self.update(|s| s.threshold_minutes = minutes)
    }

    /// # Errors
    ///
    /// Returns an error if the settings file cannot be written.
    pub fn set_message(&self, message: &str) -> Result<()> {
        self.update(|s| s.message = message.to_string())
    }

    fn update(&self, apply: impl FnOnce(&mut Settings)) -> Result<()> {
        let updated = {
            let mut settings = self.inner.write().unwrap();
            apply(&mut settings);
            settings.clone()
        };
        self.save(&updated)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(settings)?;
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }
}
