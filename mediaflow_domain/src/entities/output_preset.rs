// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Output Presets
//!
//! A named binding between a tenant and an upload destination: platform,
//! credential handle, and platform-specific metadata (privacy, playlist,
//! description template) kept opaque to the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;
use crate::value_objects::UserId;

/// Upload destination platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetPlatform {
    Youtube,
    Vk,
    YandexDisk,
    Local,
}

impl TargetPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetPlatform::Youtube => "YOUTUBE",
            TargetPlatform::Vk => "VK",
            TargetPlatform::YandexDisk => "YANDEX_DISK",
            TargetPlatform::Local => "LOCAL",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "YOUTUBE" => Ok(TargetPlatform::Youtube),
            "VK" => Ok(TargetPlatform::Vk),
            "YANDEX_DISK" => Ok(TargetPlatform::YandexDisk),
            "LOCAL" => Ok(TargetPlatform::Local),
            other => Err(FlowError::validation(format!("unknown target platform '{}'", other))),
        }
    }
}

impl std::fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named target binding for a tenant. Unique by `(user, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPreset {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub platform: TargetPlatform,
    /// Opaque handle into the external credential vault.
    pub credential_id: i64,
    pub preset_metadata: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for p in [
            TargetPlatform::Youtube,
            TargetPlatform::Vk,
            TargetPlatform::YandexDisk,
            TargetPlatform::Local,
        ] {
            assert_eq!(TargetPlatform::parse(p.as_str()).unwrap(), p);
        }
        assert!(TargetPlatform::parse("VIMEO").is_err());
    }
}
