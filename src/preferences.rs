//! Persisted user preferences (currently only the dark-mode flag)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stored preference values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceValues {
    /// Render previews for a dark terminal
    pub dark_mode: bool,
}

/// Preference values bound to their backing file
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    values: PreferenceValues,
}

impl Preferences {
    /// Load preferences from `path`. A missing file yields defaults; an unreadable one is logged
    /// and replaced by defaults on the next save.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Ignoring malformed preferences: {e}");
                PreferenceValues::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => PreferenceValues::default(),
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read preferences {}: {e}",
                    path.display()
                )));
            }
        };

        tracing::debug!(path = %path.display(), dark_mode = values.dark_mode, "Loaded preferences");
        Ok(Self { path, values })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current values
    pub fn values(&self) -> PreferenceValues {
        self.values
    }

    /// Whether dark mode is on
    pub fn dark_mode(&self) -> bool {
        self.values.dark_mode
    }

    /// Set dark mode and persist.
    pub fn set_dark_mode(&mut self, dark_mode: bool) -> Result<()> {
        self.values.dark_mode = dark_mode;
        self.save()
    }

    /// Flip dark mode, persist, and return the new value.
    pub fn toggle_dark_mode(&mut self) -> Result<bool> {
        self.set_dark_mode(!self.values.dark_mode)?;
        Ok(self.values.dark_mode)
    }

    /// Write the current values to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        tracing::debug!(path = %self.path.display(), "Saved preferences");
        Ok(())
    }
}
