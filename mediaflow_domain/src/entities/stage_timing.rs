// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Timings
//!
//! Append-only per-attempt log of stage execution, kept for analytics and
//! post-mortems. A row is opened `IN_PROGRESS` when an attempt begins and
//! finalized exactly once with the terminal status, duration, and error
//! message; it is never updated again after that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::stage::{StageStatus, StageType};
use crate::value_objects::UserId;

/// One attempt of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub id: i64,
    pub recording_id: i64,
    pub user_id: Option<UserId>,
    pub stage_type: StageType,
    /// Finer-grained step within the stage (e.g. `audio_extract` inside TRIM).
    pub substep: Option<String>,
    /// 1-based attempt counter.
    pub attempt: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub status: StageStatus,
    pub error_message: Option<String>,
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl StageTiming {
    /// Whether this row has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }
}
