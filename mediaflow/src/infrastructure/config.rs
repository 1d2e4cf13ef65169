// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Configuration
//!
//! Typed configuration for the whole process, layered from three sources in
//! increasing precedence:
//!
//! 1. built-in defaults (every field has one)
//! 2. an optional TOML file (`mediaflow.toml` or `--config <path>`)
//! 3. environment variables prefixed `MEDIAFLOW__` with `__` as the section
//!    separator (e.g. `MEDIAFLOW__RETENTION__SOFT_DELETE_TTL_HOURS=48`)
//!
//! All durations are plain integers in the unit named by the field; no
//! duration-string parsing.

use std::path::{Path, PathBuf};

use mediaflow_domain::FlowError;
use serde::Deserialize;

/// Root configuration object.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite connection URL.
    pub database_url: Option<String>,
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub scheduler: SchedulerConfig,
    pub stages: StagesConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration, layering file and environment over defaults.
    pub fn load(file: Option<&Path>) -> Result<Self, FlowError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("mediaflow").required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MEDIAFLOW")
                .prefix_separator("__")
                .separator("__"),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| FlowError::validation(format!("configuration error: {}", e)))
    }

    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or("sqlite://mediaflow.db")
    }
}

/// Filesystem layout configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the storage tree (`storage/` by default).
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

/// Deletion and expiry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Grace window between soft and hard delete.
    pub soft_delete_ttl_hours: i64,
    /// How long a recording may sit idle in INITIALIZED before expiring.
    pub initialized_ttl_hours: i64,
    /// Janitor wake-up interval.
    pub janitor_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            soft_delete_ttl_hours: 72,
            initialized_ttl_hours: 168,
            janitor_interval_secs: 300,
        }
    }
}

/// Automation scheduler knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick interval for the due-job poll.
    pub tick_secs: u64,
    /// Upper bound on recordings processed concurrently per job run.
    pub max_parallel_recordings: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            max_parallel_recordings: 3,
        }
    }
}

/// Per-stage execution knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    /// Per-chunk connect+read deadline for downloads.
    pub download_timeout_secs: u64,
    pub transcribe_timeout_secs: u64,
    pub topics_timeout_secs: u64,
    /// Candidates shorter than this are ingested as blank records.
    pub blank_min_duration_seconds: f64,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 180,
            transcribe_timeout_secs: 120,
            topics_timeout_secs: 120,
            blank_min_duration_seconds: 30.0,
        }
    }
}

/// Logging configuration forwarded to the bootstrap logger.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `compact` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database_url(), "sqlite://mediaflow.db");
        assert_eq!(config.retention.soft_delete_ttl_hours, 72);
        assert_eq!(config.scheduler.tick_secs, 30);
        assert_eq!(config.stages.download_timeout_secs, 180);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "database_url = \"sqlite://test.db\"\n\n[retention]\nsoft_delete_ttl_hours = 24\n"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database_url(), "sqlite://test.db");
        assert_eq!(config.retention.soft_delete_ttl_hours, 24);
        // Untouched sections keep their defaults.
        assert_eq!(config.retention.janitor_interval_secs, 300);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/mediaflow.toml")));
        assert!(result.is_err());
    }
}
