// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Output Targets
//!
//! One row per `(recording, target platform)`: the delivery state of a
//! processed video toward a single destination. Targets retry independently
//! of each other; a failed target never pulls the recording out of
//! `PROCESSED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::output_preset::TargetPlatform;
use crate::error::FlowError;
use crate::value_objects::UserId;

/// Upload state of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetStatus {
    #[default]
    NotUploaded,
    Uploading,
    Uploaded,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::NotUploaded => "NOT_UPLOADED",
            TargetStatus::Uploading => "UPLOADING",
            TargetStatus::Uploaded => "UPLOADED",
            TargetStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "NOT_UPLOADED" => Ok(TargetStatus::NotUploaded),
            "UPLOADING" => Ok(TargetStatus::Uploading),
            "UPLOADED" => Ok(TargetStatus::Uploaded),
            "FAILED" => Ok(TargetStatus::Failed),
            other => Err(FlowError::validation(format!("unknown target status '{}'", other))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetStatus::Uploaded | TargetStatus::Failed)
    }
}

/// Delivery state of a recording toward one destination platform.
///
/// Unique by `(recording_id, target_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub id: i64,
    pub recording_id: i64,
    pub user_id: UserId,
    /// Weak reference to the preset the upload was configured from.
    pub preset_id: Option<i64>,
    pub target_type: TargetPlatform,
    pub status: TargetStatus,
    /// Remote identity after upload: platform video id, URL.
    pub target_meta: Value,
    pub started_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub failed: bool,
    pub failed_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            TargetStatus::NotUploaded,
            TargetStatus::Uploading,
            TargetStatus::Uploaded,
            TargetStatus::Failed,
        ] {
            assert_eq!(TargetStatus::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn test_terminality() {
        assert!(TargetStatus::Uploaded.is_terminal());
        assert!(TargetStatus::Failed.is_terminal());
        assert!(!TargetStatus::Uploading.is_terminal());
    }
}
