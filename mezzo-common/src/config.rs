//! Configuration loading
//!
//! Settings are read from a TOML file whose keys match the documented
//! configuration table (kebab-case). Every key has a default so an empty
//! file is a valid configuration, except `working-dir` which must point at
//! an existing directory.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How often the scanner triggers an automatic scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePeriod {
    Never,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// Local wall-clock time of day (HH:MM) for non-hourly schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTime {
    pub hour: u8,
    pub minute: u8,
}

impl FromStr for StartTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("Invalid start time '{s}', expected HH:MM")))?;
        let hour: u8 = h
            .parse()
            .map_err(|_| Error::Config(format!("Invalid start time hour '{h}'")))?;
        let minute: u8 = m
            .parse()
            .map_err(|_| Error::Config(format!("Invalid start time minute '{m}'")))?;
        if hour > 23 || minute > 59 {
            return Err(Error::Config(format!("Start time '{s}' out of range")));
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Server settings, deserialized from the TOML configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Base directory for the database file and the feature-engine cache
    pub working_dir: PathBuf,
    /// Artwork cache byte budget
    pub cover_max_cache_size: u64,
    /// Artwork files bigger than this are rejected
    pub cover_max_file_size: u64,
    /// JPEG re-encode quality, clamped to [1, 100] where applied
    pub cover_jpeg_quality: u8,
    /// Cover file stems tried first, in order
    pub cover_preferred_file_names: Vec<String>,
    /// Automatic scan period
    pub scan_update_period: UpdatePeriod,
    /// Time of day for daily/weekly/monthly scans
    pub scan_update_start_time: StartTime,
    /// Audio file extensions considered by the scanner (lowercase, no dot)
    pub supported_extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/var/lib/mezzo"),
            cover_max_cache_size: 30 * 1000 * 1000,
            cover_max_file_size: 10 * 1000 * 1000,
            cover_jpeg_quality: 75,
            cover_preferred_file_names: vec!["cover".to_string(), "front".to_string()],
            scan_update_period: UpdatePeriod::Never,
            scan_update_start_time: StartTime { hour: 0, minute: 0 },
            supported_extensions: [
                "mp3", "flac", "ogg", "oga", "m4a", "aac", "mp4", "wav", "opus", "wma",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file and validate them.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read config file {}: {e}", path.display())))?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse config file {}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that would break service construction.
    pub fn validate(&self) -> Result<()> {
        if !self.working_dir.is_absolute() {
            return Err(Error::Config(format!(
                "working-dir '{}' is not an absolute path",
                self.working_dir.display()
            )));
        }
        if !self.working_dir.is_dir() {
            return Err(Error::Config(format!(
                "working-dir '{}' is not an existing directory",
                self.working_dir.display()
            )));
        }
        if self.supported_extensions.is_empty() {
            return Err(Error::Config("supported-extensions is empty".to_string()));
        }
        Ok(())
    }

    /// Path of the SQLite catalog file.
    pub fn db_path(&self) -> PathBuf {
        self.working_dir.join("mezzo.db")
    }

    /// Directory holding the feature-engine cache files.
    pub fn features_cache_dir(&self) -> PathBuf {
        self.working_dir.join("cache").join("features")
    }
}
