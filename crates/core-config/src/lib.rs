//! `loupe.toml` discovery and parsing.
//!
//! Discovery prefers a `loupe.toml` in the working directory, then falls back
//! to the platform config dir (`<config_dir>/loupe/loupe.toml`). Every key is
//! optional; a missing or malformed file degrades to defaults so a bad edit
//! never blocks startup (the fallback is logged once the subscriber is up).
//! Unknown fields are ignored for forward evolution.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DatabaseConfig {
    /// SQLite database holding the `logs` table. Overridable on the command
    /// line; demo mode needs none.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    /// Prefetch batch size as a multiple of the page size.
    #[serde(default = "BufferConfig::default_size_factor")]
    pub size_factor: usize,
    /// Headroom in lines kept around the viewport; 0 means "one page".
    #[serde(default)]
    pub low_threshold: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            size_factor: Self::default_size_factor(),
            low_threshold: 0,
        }
    }
}

impl BufferConfig {
    const fn default_size_factor() -> usize {
        5
    }

    pub fn buffer_size(&self, page_size: usize) -> usize {
        page_size * self.size_factor.max(1)
    }

    pub fn low_threshold(&self, page_size: usize) -> usize {
        if self.low_threshold == 0 {
            page_size
        } else {
            self.low_threshold
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TailConfig {
    /// Live-tail poll interval in milliseconds.
    #[serde(default = "TailConfig::default_poll_ms")]
    pub poll_ms: u64,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_ms: Self::default_poll_ms(),
        }
    }
}

impl TailConfig {
    const fn default_poll_ms() -> u64 {
        1000
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// Severity ceiling (0 = emerg .. 7 = debug).
    #[serde(default = "FilterConfig::default_level")]
    pub level: u8,
    /// Facility code, or -1 for all facilities.
    #[serde(default = "FilterConfig::default_facility")]
    pub facility: i16,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub host: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            facility: Self::default_facility(),
            program: String::new(),
            host: String::new(),
        }
    }
}

impl FilterConfig {
    const fn default_level() -> u8 {
        7
    }

    const fn default_facility() -> i16 {
        -1
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub tail: TailConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
}

/// Best-effort config path following platform conventions.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("loupe.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("loupe").join("loupe.toml");
    }
    PathBuf::from("loupe.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(Config {
                raw: Some(content),
                file,
            }),
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}
