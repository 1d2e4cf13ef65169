// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator
//!
//! Drives one recording through its stage plan in canonical order. Stage
//! N+1 never starts before stage N reaches a terminal state, and between
//! stages the orchestrator re-reads the recording so pause requests and
//! soft deletion take effect at the next boundary without interrupting
//! in-flight work.
//!
//! The aggregate status is rederived from the stage and target rows after
//! every stage - the orchestrator never writes a status it computed ahead
//! of time, so drift (from crashes or historical data) corrects itself on
//! the next transition.
//!
//! Pipeline timing: `pipeline_started_at` stamps on the first departure
//! from `INITIALIZED`; completion stamps when the walk reaches its terminal
//! state (READY, FAILED, or PROCESSED for plans with no upload).

use std::sync::Arc;

use mediaflow_bootstrap::CancellationToken;
use mediaflow_domain::{DeleteState, FlowError, ProcessingStatus, StagePlan, StageStatus, StageType};
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::infrastructure::runtime::stage_executor::{StageExecutor, StageResult};

/// How one orchestration pass over a recording ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The walk reached a terminal or resting status.
    Finished(ProcessingStatus),
    /// Parked by a pause request; resume re-enters at the same boundary.
    Parked,
    /// Stopped early (soft delete, failure, quota block, conflict).
    Stopped(String),
}

/// Drives recordings through their stage plans.
pub struct PipelineOrchestrator {
    app: Arc<AppContext>,
    executor: Arc<StageExecutor>,
}

impl PipelineOrchestrator {
    pub fn new(app: Arc<AppContext>, executor: Arc<StageExecutor>) -> Self {
        Self { app, executor }
    }

    /// Advances one recording as far as it can go in this pass.
    pub async fn process_recording(&self, recording_id: i64, cancel: &CancellationToken) -> Result<RunOutcome, FlowError> {
        let Some(recording) = self.app.recordings.find(recording_id).await? else {
            return Err(FlowError::not_found(format!("recording {}", recording_id)));
        };
        if recording.status.is_terminal() {
            return Ok(RunOutcome::Finished(recording.status));
        }
        if recording.status == ProcessingStatus::PendingSource {
            return Ok(RunOutcome::Stopped("source not finalized yet".into()));
        }

        let user = self
            .app
            .users
            .find_by_id(recording.user_id)
            .await?
            .ok_or_else(|| FlowError::invariant(format!("recording {} has no owner row", recording_id)))?;

        let config = recording.processing_config()?;
        let plan = StagePlan::from_config(&config);
        debug!(recording = recording_id, stages = ?plan.enabled(), "orchestrating");

        for stage_type in plan.enabled() {
            let Some(current) = self.app.recordings.find(recording_id).await? else {
                return Ok(RunOutcome::Stopped("recording disappeared".into()));
            };
            if current.delete_state != DeleteState::Active {
                info!(recording = recording_id, "soft-deleted, not scheduling further stages");
                return Ok(RunOutcome::Stopped("soft-deleted".into()));
            }
            if current.on_pause {
                info!(recording = recording_id, "paused, parking between stages");
                return Ok(RunOutcome::Parked);
            }
            if current.failed {
                return Ok(RunOutcome::Stopped("recording already failed".into()));
            }
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Stopped("cancelled".into()));
            }

            // Terminal stage rows pass through untouched (idempotence).
            if let Some(stage) = self.app.stages.get(recording_id, stage_type).await? {
                if matches!(stage.status, StageStatus::Completed | StageStatus::Skipped) {
                    continue;
                }
            }

            if stage_type == StageType::Download && current.status == ProcessingStatus::Initialized {
                self.app
                    .recordings
                    .stamp_pipeline_started(recording_id, self.app.clock.now())
                    .await?;
            }

            let result = self
                .executor
                .execute(&current, &user, &plan, &config, stage_type, cancel)
                .await?;

            match result {
                StageResult::Completed | StageResult::AlreadyComplete | StageResult::Skipped(_) => {
                    self.rederive_status(recording_id, &plan).await?;
                }
                StageResult::FailedStage(reason) => {
                    self.rederive_status(recording_id, &plan).await?;
                    if plan.is_required(stage_type) {
                        return self.finish(recording_id, &plan, Some(reason)).await;
                    }
                }
                // The executor already rolled the status back; rederiving
                // here would undo that.
                StageResult::RolledBack(reason) => {
                    return Ok(RunOutcome::Stopped(format!("rolled back: {}", reason)));
                }
                StageResult::FailedRecording(reason) => {
                    self.app
                        .recordings
                        .stamp_pipeline_completed(recording_id, self.app.clock.now())
                        .await?;
                    return Ok(RunOutcome::Stopped(format!("failed: {}", reason)));
                }
                StageResult::Blocked(reason) => {
                    self.app
                        .recordings
                        .set_block_reason(recording_id, &reason, stage_type.gerund(), self.app.clock.now())
                        .await?;
                    return Ok(RunOutcome::Stopped(format!("blocked: {}", reason)));
                }
                StageResult::Conflict(reason) => {
                    warn!(recording = recording_id, stage = %stage_type, %reason, "stage held by another worker");
                    return Ok(RunOutcome::Stopped(reason));
                }
                StageResult::Cancelled => {
                    return Ok(RunOutcome::Stopped("cancelled".into()));
                }
            }
        }

        self.finish(recording_id, &plan, None).await
    }

    /// Recomputes and persists the derived status.
    async fn rederive_status(&self, recording_id: i64, plan: &StagePlan) -> Result<(), FlowError> {
        let Some(current) = self.app.recordings.find(recording_id).await? else {
            return Ok(());
        };
        // FAILED, EXPIRED, SKIPPED and PENDING_SOURCE are owned by their
        // writers; derivation only covers the advancement states.
        if current.failed || current.status.is_terminal() || current.status == ProcessingStatus::PendingSource {
            return Ok(());
        }

        let stages = self.app.stages.list_for_recording(recording_id).await?;
        let targets = self.app.targets.list_for_recording(recording_id).await?;
        let derived = plan.aggregate_status(&stages, &targets);
        if derived != current.status {
            debug!(recording = recording_id, from = %current.status, to = %derived, "status rederived");
            self.app.recordings.update_status(recording_id, derived, self.app.clock.now()).await?;
        }
        Ok(())
    }

    /// End-of-walk bookkeeping: terminal stamps and metrics.
    async fn finish(
        &self,
        recording_id: i64,
        plan: &StagePlan,
        stop_reason: Option<String>,
    ) -> Result<RunOutcome, FlowError> {
        let Some(current) = self.app.recordings.find(recording_id).await? else {
            return Ok(RunOutcome::Stopped("recording disappeared".into()));
        };

        let pipeline_done = match current.status {
            ProcessingStatus::Ready => {
                self.app.metrics.record_ready();
                true
            }
            ProcessingStatus::Failed => true,
            // A plan without upload rests at PROCESSED; that is its finish
            // line.
            ProcessingStatus::Processed => !plan.is_required(StageType::Upload),
            _ => false,
        };
        if pipeline_done {
            self.app
                .recordings
                .stamp_pipeline_completed(recording_id, self.app.clock.now())
                .await?;
            info!(recording = recording_id, status = %current.status, "pipeline finished");
        }

        match stop_reason {
            Some(reason) => Ok(RunOutcome::Stopped(reason)),
            None => Ok(RunOutcome::Finished(current.status)),
        }
    }
}
