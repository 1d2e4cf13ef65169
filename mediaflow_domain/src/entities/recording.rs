// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recording Entity
//!
//! The central entity of the platform: a single media item discovered from a
//! source and tracked through the processing pipeline. The aggregate
//! `status` is a *derived* value - a function of the stage rows and deletion
//! fields - and must never be written without rederivation (see the stage
//! plan in `entities::stage`). The exceptions are the explicitly-marked
//! terminal states: `FAILED` (via [`Recording::mark_failure`]), `EXPIRED`
//! (janitor TTL), and `SKIPPED` (unprocessable at discovery time).
//!
//! ## Deletion
//!
//! Two-level deletion: soft delete stamps `soft_deleted_at` and schedules
//! `hard_delete_at`; the janitor later purges files and flips the row to
//! `hard_deleted`, after which no default read path returns it. Deletion
//! never interrupts an in-flight stage - the orchestrator re-reads the
//! delete state between stages.
//!
//! ## Pause
//!
//! `on_pause` cooperatively parks the pipeline between stages. A stage that
//! is already running completes normally; nothing new is scheduled until
//! resume clears the flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;
use crate::value_objects::{ProcessingConfig, UserId};

/// Aggregate pipeline status of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Discovered, but the source has not finalized the media yet.
    PendingSource,
    Initialized,
    Downloading,
    Downloaded,
    Processing,
    Processed,
    Uploading,
    Ready,
    /// Unprocessable at discovery time (blank record, nothing enabled).
    Skipped,
    Failed,
    /// Sat idle in `INITIALIZED` past the TTL.
    Expired,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::PendingSource => "PENDING_SOURCE",
            ProcessingStatus::Initialized => "INITIALIZED",
            ProcessingStatus::Downloading => "DOWNLOADING",
            ProcessingStatus::Downloaded => "DOWNLOADED",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Processed => "PROCESSED",
            ProcessingStatus::Uploading => "UPLOADING",
            ProcessingStatus::Ready => "READY",
            ProcessingStatus::Skipped => "SKIPPED",
            ProcessingStatus::Failed => "FAILED",
            ProcessingStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "PENDING_SOURCE" => Ok(ProcessingStatus::PendingSource),
            "INITIALIZED" => Ok(ProcessingStatus::Initialized),
            "DOWNLOADING" => Ok(ProcessingStatus::Downloading),
            "DOWNLOADED" => Ok(ProcessingStatus::Downloaded),
            "PROCESSING" => Ok(ProcessingStatus::Processing),
            "PROCESSED" => Ok(ProcessingStatus::Processed),
            "UPLOADING" => Ok(ProcessingStatus::Uploading),
            "READY" => Ok(ProcessingStatus::Ready),
            "SKIPPED" => Ok(ProcessingStatus::Skipped),
            "FAILED" => Ok(ProcessingStatus::Failed),
            "EXPIRED" => Ok(ProcessingStatus::Expired),
            other => Err(FlowError::validation(format!("unknown processing status '{}'", other))),
        }
    }

    /// Terminal states end the pipeline for the recording.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Ready | ProcessingStatus::Skipped | ProcessingStatus::Failed | ProcessingStatus::Expired
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-level deletion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeleteState {
    #[default]
    Active,
    SoftDeleted,
    HardDeleted,
}

impl DeleteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteState::Active => "active",
            DeleteState::SoftDeleted => "soft_deleted",
            DeleteState::HardDeleted => "hard_deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "active" => Ok(DeleteState::Active),
            "soft_deleted" => Ok(DeleteState::SoftDeleted),
            "hard_deleted" => Ok(DeleteState::HardDeleted),
            other => Err(FlowError::validation(format!("unknown delete state '{}'", other))),
        }
    }
}

/// Who or what initiated a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    User,
    Expired,
    Admin,
}

impl DeletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionReason::User => "user",
            DeletionReason::Expired => "expired",
            DeletionReason::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "user" => Ok(DeletionReason::User),
            "expired" => Ok(DeletionReason::Expired),
            "admin" => Ok(DeletionReason::Admin),
            other => Err(FlowError::validation(format!("unknown deletion reason '{}'", other))),
        }
    }
}

/// A single media item tracked through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: i64,
    pub user_id: UserId,
    pub input_source_id: Option<i64>,
    pub template_id: Option<i64>,
    pub display_name: String,
    pub start_time: DateTime<Utc>,
    /// Always seconds; minute-encoded source values are converted on ingest.
    pub duration_seconds: f64,
    pub status: ProcessingStatus,
    pub is_mapped: bool,
    pub blank_record: bool,
    pub expire_at: Option<DateTime<Utc>>,
    pub delete_state: DeleteState,
    pub deletion_reason: Option<DeletionReason>,
    pub soft_deleted_at: Option<DateTime<Utc>>,
    pub hard_delete_at: Option<DateTime<Utc>>,
    pub on_pause: bool,
    pub pause_requested_at: Option<DateTime<Utc>>,
    pub local_video_path: Option<String>,
    pub processed_video_path: Option<String>,
    pub processed_audio_path: Option<String>,
    pub transcription_dir: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub video_file_size: Option<i64>,
    pub processing_preferences: Value,
    pub failed: bool,
    pub failed_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    pub failed_at_stage: Option<String>,
    pub retry_count: i64,
    pub pipeline_started_at: Option<DateTime<Utc>>,
    pub pipeline_completed_at: Option<DateTime<Utc>>,
    pub pipeline_duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recording {
    /// Marks a permanent failure, rolling the aggregate status back to the
    /// given value so a later retry can resume from a sane point.
    pub fn mark_failure(
        &mut self,
        reason: impl Into<String>,
        rollback_to: ProcessingStatus,
        at_stage: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.failed = true;
        self.failed_reason = Some(reason.into());
        self.failed_at_stage = Some(at_stage.into());
        self.failed_at = Some(now);
        self.status = rollback_to;
        self.updated_at = now;
    }

    /// Whether the recording is visible to default read paths.
    pub fn is_hard_deleted(&self) -> bool {
        self.delete_state == DeleteState::HardDeleted
    }

    /// Whether the orchestrator may schedule further stages.
    pub fn accepts_new_stages(&self) -> bool {
        self.delete_state == DeleteState::Active && !self.on_pause && !self.failed
    }

    /// Typed view over the merged processing preferences.
    pub fn processing_config(&self) -> Result<ProcessingConfig, FlowError> {
        ProcessingConfig::from_value(&self.processing_preferences)
    }

    /// Stamps pipeline start on the first departure from `INITIALIZED`.
    pub fn stamp_pipeline_started(&mut self, now: DateTime<Utc>) {
        if self.pipeline_started_at.is_none() {
            self.pipeline_started_at = Some(now);
        }
    }

    /// Stamps pipeline completion and the derived duration.
    pub fn stamp_pipeline_completed(&mut self, now: DateTime<Utc>) {
        if self.pipeline_completed_at.is_some() {
            return;
        }
        self.pipeline_completed_at = Some(now);
        if let Some(started) = self.pipeline_started_at {
            self.pipeline_duration_seconds = Some((now - started).num_milliseconds() as f64 / 1000.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn recording() -> Recording {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        Recording {
            id: 7,
            user_id: UserId::generate(),
            input_source_id: None,
            template_id: None,
            display_name: "Python Lecture 1".into(),
            start_time: now,
            duration_seconds: 3600.0,
            status: ProcessingStatus::Initialized,
            is_mapped: false,
            blank_record: false,
            expire_at: None,
            delete_state: DeleteState::Active,
            deletion_reason: None,
            soft_deleted_at: None,
            hard_delete_at: None,
            on_pause: false,
            pause_requested_at: None,
            local_video_path: None,
            processed_video_path: None,
            processed_audio_path: None,
            transcription_dir: None,
            downloaded_at: None,
            video_file_size: None,
            processing_preferences: Value::Null,
            failed: false,
            failed_at: None,
            failed_reason: None,
            failed_at_stage: None,
            retry_count: 0,
            pipeline_started_at: None,
            pipeline_completed_at: None,
            pipeline_duration_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_mark_failure_rolls_back_status() {
        let mut r = recording();
        r.status = ProcessingStatus::Downloading;
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap();
        r.mark_failure("HTTP 404", ProcessingStatus::Initialized, "downloading", now);
        assert!(r.failed);
        assert_eq!(r.status, ProcessingStatus::Initialized);
        assert_eq!(r.failed_at_stage.as_deref(), Some("downloading"));
        assert_eq!(r.failed_at, Some(now));
    }

    #[test]
    fn test_accepts_new_stages_gates() {
        let mut r = recording();
        assert!(r.accepts_new_stages());
        r.on_pause = true;
        assert!(!r.accepts_new_stages());
        r.on_pause = false;
        r.delete_state = DeleteState::SoftDeleted;
        assert!(!r.accepts_new_stages());
    }

    #[test]
    fn test_pipeline_timing_stamps_once() {
        let mut r = recording();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap();
        r.stamp_pipeline_started(t0);
        r.stamp_pipeline_started(t1);
        assert_eq!(r.pipeline_started_at, Some(t0));
        r.stamp_pipeline_completed(t1);
        assert_eq!(r.pipeline_duration_seconds, Some(1800.0));
    }

    #[test]
    fn test_status_terminality() {
        assert!(ProcessingStatus::Ready.is_terminal());
        assert!(ProcessingStatus::Expired.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            ProcessingStatus::PendingSource,
            ProcessingStatus::Initialized,
            ProcessingStatus::Downloading,
            ProcessingStatus::Downloaded,
            ProcessingStatus::Processing,
            ProcessingStatus::Processed,
            ProcessingStatus::Uploading,
            ProcessingStatus::Ready,
            ProcessingStatus::Skipped,
            ProcessingStatus::Failed,
            ProcessingStatus::Expired,
        ] {
            assert_eq!(ProcessingStatus::parse(s.as_str()).unwrap(), s);
        }
    }
}
