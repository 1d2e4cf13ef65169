// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing Stages and the Stage Plan
//!
//! A recording advances through named stages in one canonical order:
//!
//! ```text
//! DOWNLOAD → TRIM → TRANSCRIBE → EXTRACT_TOPICS → GENERATE_SUBTITLES → UPLOAD
//! ```
//!
//! Each `(recording, stage_type)` pair has at most one [`ProcessingStage`]
//! row; that uniqueness is the serialization point that keeps two workers
//! from running the same stage concurrently.
//!
//! The [`StagePlan`] is computed once per orchestration run from the
//! recording's merged preferences: it decides which stages are enabled, which
//! of those are *required* (their failure fails the recording), and derives
//! the aggregate [`ProcessingStatus`] from the stage and target rows. The
//! status is a pure function of those rows, so drift self-corrects on the
//! next transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::output_target::{OutputTarget, TargetStatus};
use crate::entities::recording::ProcessingStatus;
use crate::error::FlowError;
use crate::value_objects::{ProcessingConfig, UserId};

/// Named step in the pipeline, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageType {
    Download,
    Trim,
    Transcribe,
    ExtractTopics,
    GenerateSubtitles,
    Upload,
}

/// Canonical execution order of all stage types.
pub const CANONICAL_STAGE_ORDER: &[StageType] = &[
    StageType::Download,
    StageType::Trim,
    StageType::Transcribe,
    StageType::ExtractTopics,
    StageType::GenerateSubtitles,
    StageType::Upload,
];

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Download => "DOWNLOAD",
            StageType::Trim => "TRIM",
            StageType::Transcribe => "TRANSCRIBE",
            StageType::ExtractTopics => "EXTRACT_TOPICS",
            StageType::GenerateSubtitles => "GENERATE_SUBTITLES",
            StageType::Upload => "UPLOAD",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "DOWNLOAD" => Ok(StageType::Download),
            "TRIM" => Ok(StageType::Trim),
            "TRANSCRIBE" => Ok(StageType::Transcribe),
            "EXTRACT_TOPICS" => Ok(StageType::ExtractTopics),
            "GENERATE_SUBTITLES" => Ok(StageType::GenerateSubtitles),
            "UPLOAD" => Ok(StageType::Upload),
            other => Err(FlowError::validation(format!("unknown stage type '{}'", other))),
        }
    }

    /// Progressive form used in `failed_at_stage` and log lines.
    pub fn gerund(&self) -> &'static str {
        match self {
            StageType::Download => "downloading",
            StageType::Trim => "trimming",
            StageType::Transcribe => "transcribing",
            StageType::ExtractTopics => "extracting_topics",
            StageType::GenerateSubtitles => "generating_subtitles",
            StageType::Upload => "uploading",
        }
    }

    /// Whether this is one of the mid-pipeline processing stages (between
    /// download and upload).
    pub fn is_processing_stage(&self) -> bool {
        matches!(
            self,
            StageType::Trim | StageType::Transcribe | StageType::ExtractTopics | StageType::GenerateSubtitles
        )
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of one stage row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "PENDING",
            StageStatus::InProgress => "IN_PROGRESS",
            StageStatus::Completed => "COMPLETED",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "PENDING" => Ok(StageStatus::Pending),
            "IN_PROGRESS" => Ok(StageStatus::InProgress),
            "COMPLETED" => Ok(StageStatus::Completed),
            "FAILED" => Ok(StageStatus::Failed),
            "SKIPPED" => Ok(StageStatus::Skipped),
            other => Err(FlowError::validation(format!("unknown stage status '{}'", other))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage row of one recording. Unique by `(recording_id, stage_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStage {
    pub id: i64,
    pub recording_id: i64,
    pub user_id: UserId,
    pub stage_type: StageType,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed: bool,
    pub failed_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    pub retry_count: i64,
    pub skip_reason: Option<String>,
    pub stage_meta: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The stage set planned for one recording, split into required and
/// optional members.
///
/// Required: DOWNLOAD always; TRIM when trimming is enabled; TRANSCRIBE when
/// transcription is enabled; UPLOAD when auto-upload with at least one
/// preset is configured. Optional: EXTRACT_TOPICS and GENERATE_SUBTITLES -
/// their failures never block progression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    required: Vec<StageType>,
    optional: Vec<StageType>,
}

impl StagePlan {
    /// Computes the plan from merged processing preferences.
    pub fn from_config(config: &ProcessingConfig) -> Self {
        let mut required = vec![StageType::Download];
        let mut optional = Vec::new();

        if config.trimming_enabled() {
            required.push(StageType::Trim);
        }
        if config.transcription_enabled() {
            required.push(StageType::Transcribe);
        }
        if config.topics_enabled() {
            optional.push(StageType::ExtractTopics);
        }
        if config.subtitles_enabled() {
            optional.push(StageType::GenerateSubtitles);
        }
        if config.upload_enabled() {
            required.push(StageType::Upload);
        }

        Self { required, optional }
    }

    /// Enabled stages in canonical execution order.
    pub fn enabled(&self) -> Vec<StageType> {
        CANONICAL_STAGE_ORDER
            .iter()
            .copied()
            .filter(|st| self.required.contains(st) || self.optional.contains(st))
            .collect()
    }

    pub fn is_required(&self, stage_type: StageType) -> bool {
        self.required.contains(&stage_type)
    }

    pub fn is_enabled(&self, stage_type: StageType) -> bool {
        self.required.contains(&stage_type) || self.optional.contains(&stage_type)
    }

    /// Derives the aggregate recording status from stage and target rows.
    ///
    /// Only the advancement states are derived here; the explicitly-marked
    /// terminal states (FAILED, EXPIRED, SKIPPED) and PENDING_SOURCE are
    /// owned by their respective writers and never recomputed.
    pub fn aggregate_status(&self, stages: &[ProcessingStage], targets: &[OutputTarget]) -> ProcessingStatus {
        let stage = |st: StageType| stages.iter().find(|s| s.stage_type == st);
        let download = stage(StageType::Download);

        // Upload phase outranks everything once it is live.
        if self.is_required(StageType::Upload) {
            if !targets.is_empty() && targets.iter().all(|t| t.status == TargetStatus::Uploaded) {
                return ProcessingStatus::Ready;
            }
            let upload_live = stage(StageType::Upload).is_some_and(|s| s.status == StageStatus::InProgress)
                || targets.iter().any(|t| t.status == TargetStatus::Uploading);
            if upload_live {
                return ProcessingStatus::Uploading;
            }
        }

        match download.map(|s| s.status) {
            Some(StageStatus::InProgress) => return ProcessingStatus::Downloading,
            Some(StageStatus::Completed) => {}
            // No download attempt yet, or a rolled-back/terminal download:
            // the recording is back at its starting line.
            _ => return ProcessingStatus::Initialized,
        }

        let processing: Vec<StageType> = self
            .enabled()
            .into_iter()
            .filter(StageType::is_processing_stage)
            .collect();
        if processing.is_empty() {
            return ProcessingStatus::Processed;
        }

        let any_in_progress = processing
            .iter()
            .any(|st| stage(*st).is_some_and(|s| s.status == StageStatus::InProgress));
        if any_in_progress {
            return ProcessingStatus::Processing;
        }

        let required_done = processing
            .iter()
            .filter(|st| self.is_required(**st))
            .all(|st| stage(*st).is_some_and(|s| matches!(s.status, StageStatus::Completed | StageStatus::Skipped)));
        if required_done {
            return ProcessingStatus::Processed;
        }

        let any_begun = processing
            .iter()
            .any(|st| stage(*st).is_some_and(|s| s.status != StageStatus::Pending));
        if any_begun {
            ProcessingStatus::Processing
        } else {
            ProcessingStatus::Downloaded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn config(value: serde_json::Value) -> ProcessingConfig {
        ProcessingConfig::from_value(&value).unwrap()
    }

    fn stage_row(stage_type: StageType, status: StageStatus) -> ProcessingStage {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        ProcessingStage {
            id: 1,
            recording_id: 7,
            user_id: UserId::generate(),
            stage_type,
            status,
            started_at: None,
            completed_at: None,
            failed: false,
            failed_at: None,
            failed_reason: None,
            retry_count: 0,
            skip_reason: None,
            stage_meta: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    fn target_row(status: TargetStatus) -> OutputTarget {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        OutputTarget {
            id: 1,
            recording_id: 7,
            user_id: UserId::generate(),
            preset_id: Some(7),
            target_type: crate::entities::output_preset::TargetPlatform::Youtube,
            status,
            target_meta: Value::Null,
            started_at: None,
            uploaded_at: None,
            failed: false,
            failed_at: None,
            failed_reason: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_plan_from_full_config() {
        let plan = StagePlan::from_config(&config(json!({
            "transcription": {"enable": true},
            "trimming": {"enable_trimming": true},
            "output_config": {"preset_ids": [7], "auto_upload": true},
        })));
        assert_eq!(
            plan.enabled(),
            vec![
                StageType::Download,
                StageType::Trim,
                StageType::Transcribe,
                StageType::ExtractTopics,
                StageType::GenerateSubtitles,
                StageType::Upload,
            ]
        );
        assert!(plan.is_required(StageType::Transcribe));
        assert!(!plan.is_required(StageType::ExtractTopics));
    }

    #[test]
    fn test_plan_minimal_config_is_download_only() {
        let plan = StagePlan::from_config(&config(json!({})));
        assert_eq!(plan.enabled(), vec![StageType::Download]);
    }

    #[test]
    fn test_status_derivation_walk() {
        let plan = StagePlan::from_config(&config(json!({
            "transcription": {"enable": true, "enable_topics": false, "enable_subtitles": false},
            "output_config": {"preset_ids": [7], "auto_upload": true},
        })));

        // Nothing begun yet.
        assert_eq!(plan.aggregate_status(&[], &[]), ProcessingStatus::Initialized);

        // Download running.
        let stages = vec![stage_row(StageType::Download, StageStatus::InProgress)];
        assert_eq!(plan.aggregate_status(&stages, &[]), ProcessingStatus::Downloading);

        // Download done, transcription pending.
        let stages = vec![stage_row(StageType::Download, StageStatus::Completed)];
        assert_eq!(plan.aggregate_status(&stages, &[]), ProcessingStatus::Downloaded);

        // Transcription running.
        let stages = vec![
            stage_row(StageType::Download, StageStatus::Completed),
            stage_row(StageType::Transcribe, StageStatus::InProgress),
        ];
        assert_eq!(plan.aggregate_status(&stages, &[]), ProcessingStatus::Processing);

        // Transcription done.
        let stages = vec![
            stage_row(StageType::Download, StageStatus::Completed),
            stage_row(StageType::Transcribe, StageStatus::Completed),
        ];
        assert_eq!(plan.aggregate_status(&stages, &[]), ProcessingStatus::Processed);

        // Upload running.
        let with_upload = vec![
            stage_row(StageType::Download, StageStatus::Completed),
            stage_row(StageType::Transcribe, StageStatus::Completed),
            stage_row(StageType::Upload, StageStatus::InProgress),
        ];
        assert_eq!(
            plan.aggregate_status(&with_upload, &[target_row(TargetStatus::Uploading)]),
            ProcessingStatus::Uploading
        );

        // All targets delivered.
        assert_eq!(
            plan.aggregate_status(&with_upload, &[target_row(TargetStatus::Uploaded)]),
            ProcessingStatus::Ready
        );
    }

    #[test]
    fn test_optional_stage_failure_does_not_block_processed() {
        let plan = StagePlan::from_config(&config(json!({
            "transcription": {"enable": true},
        })));
        let stages = vec![
            stage_row(StageType::Download, StageStatus::Completed),
            stage_row(StageType::Transcribe, StageStatus::Completed),
            stage_row(StageType::ExtractTopics, StageStatus::Failed),
            stage_row(StageType::GenerateSubtitles, StageStatus::Skipped),
        ];
        assert_eq!(plan.aggregate_status(&stages, &[]), ProcessingStatus::Processed);
    }

    #[test]
    fn test_download_only_plan_is_processed_after_download() {
        let plan = StagePlan::from_config(&config(json!({})));
        let stages = vec![stage_row(StageType::Download, StageStatus::Completed)];
        assert_eq!(plan.aggregate_status(&stages, &[]), ProcessingStatus::Processed);
    }

    #[test]
    fn test_stage_type_round_trip() {
        for st in CANONICAL_STAGE_ORDER {
            assert_eq!(StageType::parse(st.as_str()).unwrap(), *st);
        }
    }
}
