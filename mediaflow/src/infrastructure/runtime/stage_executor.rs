// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Executor
//!
//! Runs a single `(recording, stage)` with the full protocol:
//!
//! 1. **Admission** - a `COMPLETED` stage short-circuits to success
//!    (idempotence); an `IN_PROGRESS` row rejects the attempt with a
//!    `concurrent-stage` conflict; a `FAILED` row past its retry budget is
//!    final.
//! 2. **Quota admission** - DOWNLOAD and UPLOAD check storage and the
//!    concurrency gauge, TRANSCRIBE checks the gauge. Denial skips an
//!    optional stage and blocks a required one; it never fails the
//!    recording outright.
//! 3. **Begin** - the stage row flips to `IN_PROGRESS` under a guarded
//!    update and the attempt opens a timing row.
//! 4. **Gauge up**, **run** (with per-stage timeout and cancellation),
//!    **finalize**, **gauge down** - the decrement runs on every exit path.
//!
//! Retries are local to this executor: transient outcomes sleep out the
//! stage's backoff slice and try again, each attempt appending its own
//! timing row and bumping `retry_count`. The orchestrator never retries a
//! whole recording.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mediaflow_bootstrap::CancellationToken;
use mediaflow_domain::{
    FlowError, ProcessingConfig, ProcessingStatus, Recording, StagePlan, StageStatus, StageType, User,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::application::services::quota_ledger::QuotaLedger;
use crate::context::AppContext;
use crate::infrastructure::stages::{
    ActionContext, DownloadAction, RetryPolicy, StageAction, StageOutcome, SubtitlesAction, TopicsAction,
    TranscribeAction, TrimAction, UploadAction,
};

/// How one stage execution ended, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    /// The stage had already completed; nothing ran.
    AlreadyComplete,
    Completed,
    Skipped(String),
    /// Retry budget exhausted; the recording rolled back for a later pass.
    RolledBack(String),
    /// Fatal on the required path; the recording is now FAILED.
    FailedRecording(String),
    /// The stage failed but the recording survives (upload targets).
    FailedStage(String),
    /// Required-path admission denial; stop advancing, don't fail.
    Blocked(String),
    /// Another worker holds the stage.
    Conflict(String),
    /// Shutdown interrupted the attempt mid-flight.
    Cancelled,
}

/// Executes stage actions with admission, retry, and bookkeeping.
pub struct StageExecutor {
    app: Arc<AppContext>,
    ledger: QuotaLedger,
    actions: HashMap<StageType, Arc<dyn StageAction>>,
}

impl StageExecutor {
    /// Builds the executor with the default action registry.
    pub fn new(app: Arc<AppContext>, ledger: QuotaLedger) -> Self {
        let mut actions: HashMap<StageType, Arc<dyn StageAction>> = HashMap::new();
        for action in [
            Arc::new(DownloadAction) as Arc<dyn StageAction>,
            Arc::new(TrimAction),
            Arc::new(TranscribeAction),
            Arc::new(TopicsAction),
            Arc::new(SubtitlesAction),
            Arc::new(UploadAction),
        ] {
            actions.insert(action.stage_type(), action);
        }
        Self { app, ledger, actions }
    }

    /// Executes one stage of one recording to a terminal state.
    pub async fn execute(
        &self,
        recording: &Recording,
        user: &User,
        plan: &StagePlan,
        config: &ProcessingConfig,
        stage_type: StageType,
        cancel: &CancellationToken,
    ) -> Result<StageResult, FlowError> {
        let policy = RetryPolicy::for_stage(stage_type);
        let required = plan.is_required(stage_type);
        let now = self.app.clock.now();

        // 1. Admission on the existing stage row.
        if let Some(existing) = self.app.stages.get(recording.id, stage_type).await? {
            match existing.status {
                StageStatus::Completed => return Ok(StageResult::AlreadyComplete),
                StageStatus::InProgress => {
                    return Ok(StageResult::Conflict(format!(
                        "concurrent-stage: {} already in progress",
                        stage_type
                    )))
                }
                StageStatus::Failed if existing.retry_count >= policy.max_attempts as i64 => {
                    return Ok(StageResult::FailedStage(format!(
                        "{} retry budget exhausted ({} attempts)",
                        stage_type, existing.retry_count
                    )));
                }
                _ => {}
            }
        }

        // 2. Quota admission.
        if let Some(denial) = self.quota_admission(recording, user, stage_type).await? {
            self.app.metrics.record_quota_denial();
            if required {
                warn!(recording = recording.id, stage = %stage_type, reason = %denial, "required stage blocked by quota");
                return Ok(StageResult::Blocked(denial));
            }
            self.app
                .stages
                .mark_skipped(recording.id, recording.user_id, stage_type, &denial, now)
                .await?;
            return Ok(StageResult::Skipped(denial));
        }

        let Some(action) = self.actions.get(&stage_type).cloned() else {
            return Err(FlowError::invariant(format!("no action registered for stage {}", stage_type)));
        };

        // 3. Begin: flip to IN_PROGRESS under the uniqueness guard.
        self.app
            .stages
            .ensure_pending(recording.id, recording.user_id, stage_type, now)
            .await?;
        if let Err(e) = self.app.stages.begin(recording.id, stage_type, now).await {
            return match e {
                FlowError::Conflict(msg) => Ok(StageResult::Conflict(msg)),
                other => Err(other),
            };
        }
        let attempt_base = self
            .app
            .stages
            .get(recording.id, stage_type)
            .await?
            .map(|s| s.retry_count)
            .unwrap_or(1);

        // 4. Gauge up; from here every exit path must decrement.
        self.ledger.adjust_concurrent_tasks(recording.user_id, 1).await?;
        self.app.metrics.stage_task_started();
        let started = std::time::Instant::now();

        let result = self
            .run_attempts(recording, user, config, stage_type, policy, attempt_base, &action, cancel)
            .await;

        // 7. Gauge down, always.
        self.app.metrics.stage_task_finished();
        if let Err(e) = self.ledger.adjust_concurrent_tasks(recording.user_id, -1).await {
            warn!(recording = recording.id, error = %e, "failed to decrement concurrency gauge");
        }

        if let Ok(outcome) = &result {
            self.app
                .metrics
                .record_stage(stage_type.as_str(), result_label(outcome), started.elapsed().as_secs_f64());
        }
        result
    }

    /// The internal attempt loop (steps 5 and 6 of the protocol).
    #[allow(clippy::too_many_arguments)]
    async fn run_attempts(
        &self,
        recording: &Recording,
        user: &User,
        config: &ProcessingConfig,
        stage_type: StageType,
        policy: RetryPolicy,
        attempt_base: i64,
        action: &Arc<dyn StageAction>,
        cancel: &CancellationToken,
    ) -> Result<StageResult, FlowError> {
        let action_ctx = ActionContext {
            app: self.app.clone(),
            recording: recording.clone(),
            user: user.clone(),
            config: config.clone(),
            cancel: cancel.clone(),
        };
        let allow_errors = stage_type == StageType::Transcribe && config.allow_transcription_errors();

        for attempt in 1..=policy.max_attempts {
            let attempt_number = attempt_base + (attempt as i64) - 1;
            let timing_id = self
                .app
                .timings
                .open(recording.id, recording.user_id, stage_type, None, attempt_number, self.app.clock.now())
                .await?;

            let outcome = self.run_one(action, &action_ctx, stage_type, cancel).await;

            match outcome {
                StageOutcome::Ok(meta) => {
                    let now = self.app.clock.now();
                    self.app.timings.finalize(timing_id, StageStatus::Completed, None, &meta, now).await?;
                    self.app
                        .stages
                        .finalize(recording.id, stage_type, StageStatus::Completed, None, None, &meta, now)
                        .await?;
                    info!(recording = recording.id, stage = %stage_type, attempt = attempt_number, "stage completed");
                    return Ok(StageResult::Completed);
                }

                StageOutcome::Skipped(reason) => {
                    let now = self.app.clock.now();
                    self.app
                        .timings
                        .finalize(timing_id, StageStatus::Skipped, Some(&reason), &Value::Null, now)
                        .await?;
                    self.app
                        .stages
                        .finalize(recording.id, stage_type, StageStatus::Skipped, None, Some(&reason), &Value::Null, now)
                        .await?;
                    return Ok(StageResult::Skipped(reason));
                }

                StageOutcome::Retryable(reason) => {
                    let now = self.app.clock.now();
                    self.app
                        .timings
                        .finalize(timing_id, StageStatus::Failed, Some(&reason), &Value::Null, now)
                        .await?;

                    if cancel.is_cancelled() {
                        return Ok(StageResult::Cancelled);
                    }
                    if attempt < policy.max_attempts {
                        let delay = policy.delay_before(attempt + 1);
                        warn!(
                            recording = recording.id,
                            stage = %stage_type,
                            attempt = attempt_number,
                            delay_secs = delay.as_secs(),
                            reason = %reason,
                            "transient stage failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        self.app.stages.count_attempt(recording.id, stage_type, self.app.clock.now()).await?;
                        continue;
                    }
                    return self.on_retries_exhausted(recording, stage_type, policy, allow_errors, reason).await;
                }

                StageOutcome::Fatal(reason) => {
                    let now = self.app.clock.now();
                    self.app
                        .timings
                        .finalize(timing_id, StageStatus::Failed, Some(&reason), &Value::Null, now)
                        .await?;
                    return self.on_fatal(recording, stage_type, policy, allow_errors, reason).await;
                }
            }
        }

        Err(FlowError::invariant(format!("attempt loop for {} fell through", stage_type)))
    }

    /// One attempt, bounded by the stage's timeout and cancellation.
    async fn run_one(
        &self,
        action: &Arc<dyn StageAction>,
        ctx: &ActionContext,
        stage_type: StageType,
        cancel: &CancellationToken,
    ) -> StageOutcome {
        let fut = action.run(ctx);

        match self.timeout_for(stage_type) {
            Some(limit) => {
                tokio::select! {
                    outcome = tokio::time::timeout(limit, fut) => match outcome {
                        Ok(outcome) => outcome,
                        Err(_) => StageOutcome::Retryable(format!("{} timed out after {:?}", stage_type, limit)),
                    },
                    _ = cancel.cancelled() => StageOutcome::Retryable("cancelled".into()),
                }
            }
            None => {
                tokio::select! {
                    outcome = fut => outcome,
                    _ = cancel.cancelled() => StageOutcome::Retryable("cancelled".into()),
                }
            }
        }
    }

    async fn on_retries_exhausted(
        &self,
        recording: &Recording,
        stage_type: StageType,
        policy: RetryPolicy,
        allow_errors: bool,
        reason: String,
    ) -> Result<StageResult, FlowError> {
        let now = self.app.clock.now();

        if policy.skip_on_failure || allow_errors {
            self.app
                .stages
                .finalize(recording.id, stage_type, StageStatus::Skipped, None, Some(&reason), &Value::Null, now)
                .await?;
            return Ok(StageResult::Skipped(reason));
        }

        self.app
            .stages
            .finalize(recording.id, stage_type, StageStatus::Failed, Some(&reason), None, &Value::Null, now)
            .await?;

        if let Some(rollback) = policy.rollback_to {
            // The recording goes back to its pre-stage status for a later
            // pass; a paused recording is released so the retry can run.
            self.app.recordings.update_status(recording.id, rollback, now).await?;
            if stage_type == StageType::Download {
                self.app.recordings.set_pause(recording.id, false, now).await?;
            }
            warn!(recording = recording.id, stage = %stage_type, rollback = %rollback, "retries exhausted, rolled back");
            return Ok(StageResult::RolledBack(reason));
        }

        Ok(StageResult::FailedStage(reason))
    }

    async fn on_fatal(
        &self,
        recording: &Recording,
        stage_type: StageType,
        policy: RetryPolicy,
        allow_errors: bool,
        reason: String,
    ) -> Result<StageResult, FlowError> {
        let now = self.app.clock.now();

        if policy.skip_on_failure || allow_errors {
            self.app
                .stages
                .finalize(recording.id, stage_type, StageStatus::Skipped, None, Some(&reason), &Value::Null, now)
                .await?;
            return Ok(StageResult::Skipped(reason));
        }

        self.app
            .stages
            .finalize(recording.id, stage_type, StageStatus::Failed, Some(&reason), None, &Value::Null, now)
            .await?;

        if policy.fails_recording {
            self.app
                .recordings
                .mark_failure(recording.id, &reason, ProcessingStatus::Failed, stage_type.gerund(), now)
                .await?;
            self.app.metrics.record_failed();
            warn!(recording = recording.id, stage = %stage_type, reason = %reason, "fatal stage failure, recording FAILED");
            return Ok(StageResult::FailedRecording(reason));
        }

        Ok(StageResult::FailedStage(reason))
    }

    async fn quota_admission(
        &self,
        recording: &Recording,
        user: &User,
        stage_type: StageType,
    ) -> Result<Option<String>, FlowError> {
        let check_storage = matches!(stage_type, StageType::Download | StageType::Upload);
        let check_tasks = matches!(stage_type, StageType::Download | StageType::Upload | StageType::Transcribe);

        if check_storage {
            let admission = self.ledger.check_storage(recording.user_id, user.user_slug).await?;
            if let Some(reason) = admission.reason() {
                return Ok(Some(reason.to_string()));
            }
        }
        if check_tasks {
            let admission = self.ledger.check_concurrent_tasks(recording.user_id).await?;
            if let Some(reason) = admission.reason() {
                return Ok(Some(reason.to_string()));
            }
        }
        Ok(None)
    }

    fn timeout_for(&self, stage_type: StageType) -> Option<Duration> {
        let stages = &self.app.config.stages;
        match stage_type {
            StageType::Download => Some(Duration::from_secs(stages.download_timeout_secs)),
            StageType::Transcribe => Some(Duration::from_secs(stages.transcribe_timeout_secs)),
            StageType::ExtractTopics | StageType::GenerateSubtitles => {
                Some(Duration::from_secs(stages.topics_timeout_secs))
            }
            // Trim encodes and upload manages its own per-target budget;
            // both are bounded by cancellation instead of a wall clock.
            StageType::Trim | StageType::Upload => None,
        }
    }
}

fn result_label(result: &StageResult) -> &'static str {
    match result {
        StageResult::AlreadyComplete => "already_complete",
        StageResult::Completed => "completed",
        StageResult::Skipped(_) => "skipped",
        StageResult::RolledBack(_) => "rolled_back",
        StageResult::FailedRecording(_) => "failed_recording",
        StageResult::FailedStage(_) => "failed_stage",
        StageResult::Blocked(_) => "blocked",
        StageResult::Conflict(_) => "conflict",
        StageResult::Cancelled => "cancelled",
    }
}
