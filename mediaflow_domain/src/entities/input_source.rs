// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Input Sources
//!
//! A named binding between a tenant and a third-party recording source.
//! The adapter-specific configuration stays an opaque JSON blob; the core
//! only needs the source type to pick an adapter and the sync bookkeeping
//! (`last_sync_at`, last error) that discovery maintains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;
use crate::value_objects::UserId;

/// Third-party platform a recording can be discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Zoom,
    GoogleDrive,
    YandexDisk,
    Local,
    ExternalUrl,
    Youtube,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Zoom => "ZOOM",
            SourceType::GoogleDrive => "GOOGLE_DRIVE",
            SourceType::YandexDisk => "YANDEX_DISK",
            SourceType::Local => "LOCAL",
            SourceType::ExternalUrl => "EXTERNAL_URL",
            SourceType::Youtube => "YOUTUBE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "ZOOM" => Ok(SourceType::Zoom),
            "GOOGLE_DRIVE" => Ok(SourceType::GoogleDrive),
            "YANDEX_DISK" => Ok(SourceType::YandexDisk),
            "LOCAL" => Ok(SourceType::Local),
            "EXTERNAL_URL" => Ok(SourceType::ExternalUrl),
            "YOUTUBE" => Ok(SourceType::Youtube),
            other => Err(FlowError::validation(format!("unknown source type '{}'", other))),
        }
    }

    /// Conference-cloud listings report durations in minutes; everything else
    /// already reports seconds. Ingest normalizes using this flag.
    pub fn reports_duration_in_minutes(&self) -> bool {
        matches!(self, SourceType::Zoom)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named source binding for a tenant.
///
/// Unique by `(user, name, source_type, credential_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSource {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub source_type: SourceType,
    /// Opaque handle into the external credential vault.
    pub credential_id: Option<i64>,
    pub config: Value,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
