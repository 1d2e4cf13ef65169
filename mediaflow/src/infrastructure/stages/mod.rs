// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Actions
//!
//! One action per stage type, registered with the executor by stage type.
//! Actions are pure in terms of orchestration: they do the work and report
//! a [`StageOutcome`]; every durable transition (stage rows, timings, the
//! gauge, recording status) is owned by the executor.
//!
//! The per-stage retry policy lives here too: backoff slices, rollback
//! targets, and whether a fatal error on the stage fails the whole
//! recording.

pub mod download;
pub mod subtitles;
pub mod topics;
pub mod transcribe;
pub mod trim;
pub mod upload;

pub use download::DownloadAction;
pub use subtitles::SubtitlesAction;
pub use topics::TopicsAction;
pub use transcribe::TranscribeAction;
pub use trim::TrimAction;
pub use upload::UploadAction;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediaflow_bootstrap::CancellationToken;
use mediaflow_domain::{ProcessingConfig, ProcessingStatus, Recording, StageType, User};
use serde_json::Value;

use crate::context::AppContext;

/// What one stage attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Work done; meta lands on the stage row.
    Ok(Value),
    /// Nothing to do, by configuration or capability; never retried.
    Skipped(String),
    /// Transient failure; the executor retries with backoff.
    Retryable(String),
    /// Permanent failure; no retry.
    Fatal(String),
}

/// Everything an action may touch while running one stage.
pub struct ActionContext {
    pub app: Arc<AppContext>,
    pub recording: Recording,
    pub user: User,
    pub config: ProcessingConfig,
    pub cancel: CancellationToken,
}

impl ActionContext {
    pub fn user_slug(&self) -> i64 {
        self.user.user_slug
    }
}

/// One pipeline stage's work, dispatched by the executor.
#[async_trait]
pub trait StageAction: Send + Sync {
    fn stage_type(&self) -> StageType;

    async fn run(&self, ctx: &ActionContext) -> StageOutcome;
}

/// Retry policy of one stage type.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Sleep before retry N+1; the last entry repeats.
    delays_secs: &'static [u64],
    /// Ceiling over the delay slice.
    cap_secs: u64,
    /// Status to roll the recording back to when retries are exhausted.
    pub rollback_to: Option<ProcessingStatus>,
    /// Exhaustion and fatal degrade to SKIPPED instead of failing anything.
    pub skip_on_failure: bool,
    /// A fatal error on this stage marks the whole recording FAILED.
    pub fails_recording: bool,
}

impl RetryPolicy {
    pub fn for_stage(stage_type: StageType) -> Self {
        match stage_type {
            StageType::Download => Self {
                max_attempts: 10,
                delays_secs: &[3, 5, 5, 10, 15, 20, 25, 30],
                cap_secs: 30,
                rollback_to: Some(ProcessingStatus::Initialized),
                skip_on_failure: false,
                fails_recording: true,
            },
            StageType::Trim => Self {
                max_attempts: 3,
                delays_secs: &[5, 15, 30],
                cap_secs: 30,
                rollback_to: Some(ProcessingStatus::Downloaded),
                skip_on_failure: false,
                fails_recording: true,
            },
            StageType::Transcribe => Self {
                max_attempts: 3,
                delays_secs: &[10, 30, 60],
                cap_secs: 60,
                rollback_to: Some(ProcessingStatus::Downloaded),
                skip_on_failure: false,
                fails_recording: true,
            },
            StageType::ExtractTopics | StageType::GenerateSubtitles => Self {
                max_attempts: 2,
                delays_secs: &[10, 30],
                cap_secs: 30,
                rollback_to: None,
                skip_on_failure: true,
                fails_recording: false,
            },
            // Upload retries per target inside the action; the executor
            // makes a single pass, and a failed target never fails the
            // recording.
            StageType::Upload => Self {
                max_attempts: 1,
                delays_secs: &[10],
                cap_secs: 300,
                rollback_to: None,
                skip_on_failure: false,
                fails_recording: false,
            },
        }
    }

    /// Sleep before attempt `next_attempt` (2-based: there is no delay
    /// before the first attempt).
    pub fn delay_before(&self, next_attempt: u32) -> Duration {
        let index = (next_attempt.saturating_sub(2)) as usize;
        let raw = self
            .delays_secs
            .get(index)
            .or(self.delays_secs.last())
            .copied()
            .unwrap_or(self.cap_secs);
        Duration::from_secs(raw.min(self.cap_secs))
    }
}

/// Per-target upload backoff: 10s doubling, capped at 300s.
pub fn upload_backoff(attempt: u32) -> Duration {
    let secs = 10u64.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    Duration::from_secs(secs.min(300))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_policy_shape() {
        let policy = RetryPolicy::for_stage(StageType::Download);
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay_before(2), Duration::from_secs(3));
        assert_eq!(policy.delay_before(3), Duration::from_secs(5));
        assert_eq!(policy.delay_before(4), Duration::from_secs(5));
        // Past the slice end the last entry repeats, capped.
        assert_eq!(policy.delay_before(10), Duration::from_secs(30));
        assert_eq!(policy.delay_before(99), Duration::from_secs(30));
        assert_eq!(policy.rollback_to, Some(ProcessingStatus::Initialized));
    }

    #[test]
    fn test_trim_and_transcribe_policies() {
        let trim = RetryPolicy::for_stage(StageType::Trim);
        assert_eq!(trim.max_attempts, 3);
        assert_eq!(trim.delay_before(2), Duration::from_secs(5));
        assert_eq!(trim.delay_before(3), Duration::from_secs(15));
        assert_eq!(trim.rollback_to, Some(ProcessingStatus::Downloaded));

        let transcribe = RetryPolicy::for_stage(StageType::Transcribe);
        assert_eq!(transcribe.delay_before(3), Duration::from_secs(30));
        assert!(transcribe.fails_recording);
    }

    #[test]
    fn test_optional_stages_skip_on_failure() {
        for stage in [StageType::ExtractTopics, StageType::GenerateSubtitles] {
            let policy = RetryPolicy::for_stage(stage);
            assert!(policy.skip_on_failure);
            assert!(!policy.fails_recording);
            assert_eq!(policy.max_attempts, 2);
        }
    }

    #[test]
    fn test_upload_backoff_doubles_with_cap() {
        assert_eq!(upload_backoff(1), Duration::from_secs(10));
        assert_eq!(upload_backoff(2), Duration::from_secs(20));
        assert_eq!(upload_backoff(3), Duration::from_secs(40));
        assert_eq!(upload_backoff(4), Duration::from_secs(80));
        assert_eq!(upload_backoff(5), Duration::from_secs(160));
        assert_eq!(upload_backoff(6), Duration::from_secs(300));
        assert_eq!(upload_backoff(20), Duration::from_secs(300));
    }
}
