// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Service API
//!
//! Thin in-process facade any front-end can bind to. Every call validates
//! before it writes, scopes lookups to the calling user (a foreign entity
//! surfaces as not-found, never as forbidden-with-details), and returns
//! domain values - no transport types here.

use std::sync::Arc;

use mediaflow_bootstrap::CancellationToken;
use mediaflow_domain::{merge_configs, AutomationJob, DeletionReason, FlowError, ProcessingConfig, Recording, UserId};
use serde_json::Value;
use tracing::info;

use crate::application::services::automation::{AutomationService, DryRunReport, JobDraft, JobUpdate, RunJobReport};
use crate::application::services::quota_ledger::{QuotaLedger, QuotaStatus};
use crate::context::AppContext;

/// Result of a manual job trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerResult {
    Ran(RunJobReport),
    DryRan(DryRunReport),
}

/// In-process service facade.
#[derive(Clone)]
pub struct ServiceApi {
    app: Arc<AppContext>,
    ledger: QuotaLedger,
    automation: AutomationService,
}

impl ServiceApi {
    pub fn new(app: Arc<AppContext>, ledger: QuotaLedger, automation: AutomationService) -> Self {
        Self { app, ledger, automation }
    }

    // --- automation jobs -------------------------------------------------

    pub async fn create_job(&self, user_id: UserId, draft: JobDraft) -> Result<AutomationJob, FlowError> {
        self.automation.create_job(user_id, draft).await
    }

    pub async fn update_job(&self, user_id: UserId, job_id: i64, update: JobUpdate) -> Result<AutomationJob, FlowError> {
        self.automation.update_job(user_id, job_id, update).await
    }

    pub async fn delete_job(&self, user_id: UserId, job_id: i64) -> Result<(), FlowError> {
        self.automation.delete_job(user_id, job_id).await
    }

    pub async fn get_job(&self, user_id: UserId, job_id: i64) -> Result<AutomationJob, FlowError> {
        self.automation.get_job(user_id, job_id).await
    }

    pub async fn list_jobs(&self, user_id: UserId) -> Result<Vec<AutomationJob>, FlowError> {
        self.automation.list_jobs(user_id).await
    }

    /// Manual trigger, optionally as a dry run that writes nothing.
    pub async fn trigger_job(
        &self,
        user_id: UserId,
        job_id: i64,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<TriggerResult, FlowError> {
        let job = self.automation.get_job(user_id, job_id).await?;
        if dry_run {
            return Ok(TriggerResult::DryRan(self.automation.dry_run_job(&job).await?));
        }
        let report = self.automation.run_job(&job, cancel).await?;
        let now = self.app.clock.now();
        let next = job.schedule.next_fire_after(now)?;
        self.app.jobs.mark_triggered(job.id, now, next).await?;
        Ok(TriggerResult::Ran(report))
    }

    // --- recordings ------------------------------------------------------

    /// Merge-PATCH over the recording's processing/output preferences. The
    /// merged result must still parse as a valid config.
    pub async fn update_recording_config(
        &self,
        user_id: UserId,
        recording_id: i64,
        patch: Value,
    ) -> Result<Recording, FlowError> {
        let recording = self.owned_recording(user_id, recording_id).await?;

        let merged = merge_configs(&recording.processing_preferences, &patch);
        // Reject a patch that breaks the typed view before persisting it.
        ProcessingConfig::from_value(&merged)
            .map_err(|e| FlowError::validation(format!("invalid config patch: {}", e)))?;

        self.app
            .recordings
            .apply_preferences(recording_id, &merged, None, self.app.clock.now())
            .await?;
        self.owned_recording(user_id, recording_id).await
    }

    pub async fn soft_delete_recording(&self, user_id: UserId, recording_id: i64) -> Result<(), FlowError> {
        let recording = self.owned_recording(user_id, recording_id).await?;

        let now = self.app.clock.now();
        let hard_delete_at = now + chrono::Duration::hours(self.app.config.retention.soft_delete_ttl_hours);
        if !self
            .app
            .recordings
            .soft_delete(recording.id, DeletionReason::User, now, hard_delete_at)
            .await?
        {
            return Err(FlowError::conflict(format!("recording {} is already deleted", recording_id)));
        }
        info!(recording = recording_id, %hard_delete_at, "recording soft-deleted");
        Ok(())
    }

    pub async fn pause_recording(&self, user_id: UserId, recording_id: i64) -> Result<(), FlowError> {
        let recording = self.owned_recording(user_id, recording_id).await?;
        self.app.recordings.set_pause(recording.id, true, self.app.clock.now()).await
    }

    pub async fn resume_recording(&self, user_id: UserId, recording_id: i64) -> Result<(), FlowError> {
        let recording = self.owned_recording(user_id, recording_id).await?;
        self.app.recordings.set_pause(recording.id, false, self.app.clock.now()).await
    }

    pub async fn get_recording(&self, user_id: UserId, recording_id: i64) -> Result<Recording, FlowError> {
        self.owned_recording(user_id, recording_id).await
    }

    // --- quotas ----------------------------------------------------------

    pub async fn get_quota_status(&self, user_id: UserId) -> Result<QuotaStatus, FlowError> {
        let user = self
            .app
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("user {}", user_id)))?;
        self.ledger.quota_status(user_id, user.user_slug).await
    }

    async fn owned_recording(&self, user_id: UserId, recording_id: i64) -> Result<Recording, FlowError> {
        self.app
            .recordings
            .find_owned(user_id, recording_id)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("recording {}", recording_id)))
    }
}
