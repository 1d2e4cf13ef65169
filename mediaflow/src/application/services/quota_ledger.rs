// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Quota Ledger
//!
//! The single authority on per-tenant limits and usage. Effective limits
//! resolve custom overrides over plan defaults over the built-in fallback;
//! `Unlimited` short-circuits every check to an admission.
//!
//! Storage is the one resource measured, not counted: the check walks the
//! user's storage subtree at admission time and never persists the result,
//! so external cleanups are reflected immediately.

use std::sync::Arc;

use mediaflow_domain::{Admission, EffectiveQuotas, FlowError, QuotaLimit, ResourceUsage, UserId};
use serde::Serialize;
use tracing::debug;

use crate::context::AppContext;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Full usage report for the quota status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub recordings: ResourceUsage,
    pub storage_used_gb: f64,
    pub storage_limit_gb: Option<i64>,
    pub concurrent_tasks: ResourceUsage,
    pub automation_jobs: ResourceUsage,
}

/// Per-tenant quota authority.
#[derive(Clone)]
pub struct QuotaLedger {
    app: Arc<AppContext>,
}

impl QuotaLedger {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }

    /// Resolved limits: custom override > plan default > built-in default.
    pub async fn effective(&self, user_id: UserId) -> Result<EffectiveQuotas, FlowError> {
        let Some(subscription) = self.app.subscriptions.find_subscription(user_id).await? else {
            return Ok(EffectiveQuotas::builtin_defaults());
        };
        let plan = self
            .app
            .subscriptions
            .find_plan(subscription.plan_id)
            .await?
            .ok_or_else(|| FlowError::invariant(format!("subscription references missing plan {}", subscription.plan_id)))?;
        Ok(subscription.effective_with(&plan))
    }

    /// Can this user create one more recording this month?
    pub async fn check_recordings(&self, user_id: UserId) -> Result<Admission, FlowError> {
        let limit = self.effective(user_id).await?.max_recordings_per_month;
        let QuotaLimit::Limited(max) = limit else {
            return Ok(Admission::Ok);
        };

        let period = self.app.clock.period();
        let used = self
            .app
            .subscriptions
            .find_usage(user_id, period)
            .await?
            .map(|u| u.recordings_count)
            .unwrap_or(0);

        if used >= max {
            return Ok(Admission::Denied(format!("monthly recordings quota exceeded: {}/month", max)));
        }
        Ok(Admission::Ok)
    }

    /// Is the user's storage subtree under its limit? Measured from disk.
    pub async fn check_storage(&self, user_id: UserId, user_slug: i64) -> Result<Admission, FlowError> {
        let limit = self.effective(user_id).await?.max_storage_gb;
        let QuotaLimit::Limited(max_gb) = limit else {
            return Ok(Admission::Ok);
        };

        let used_bytes = self.storage_bytes(user_slug).await?;
        let max_bytes = (max_gb as u64).saturating_mul(BYTES_PER_GB);
        if used_bytes >= max_bytes {
            let used_gb = used_bytes as f64 / BYTES_PER_GB as f64;
            return Ok(Admission::Denied(format!(
                "storage quota exceeded: {:.2}/{} GB",
                used_gb, max_gb
            )));
        }
        Ok(Admission::Ok)
    }

    /// May the user start one more concurrent task right now?
    pub async fn check_concurrent_tasks(&self, user_id: UserId) -> Result<Admission, FlowError> {
        let limit = self.effective(user_id).await?.max_concurrent_tasks;
        let QuotaLimit::Limited(max) = limit else {
            return Ok(Admission::Ok);
        };

        let current = self.app.subscriptions.gauge(user_id).await?;
        if current >= max {
            return Ok(Admission::Denied(format!("concurrent tasks limit exceeded: {}", max)));
        }
        Ok(Admission::Ok)
    }

    /// May the user create one more automation job?
    pub async fn check_automation_jobs(&self, user_id: UserId) -> Result<Admission, FlowError> {
        let limit = self.effective(user_id).await?.max_automation_jobs;
        let QuotaLimit::Limited(max) = limit else {
            return Ok(Admission::Ok);
        };

        let current = self.app.jobs.count_for_user(user_id).await?;
        if current >= max {
            return Ok(Admission::Denied(format!("automation job limit reached ({} jobs maximum)", max)));
        }
        Ok(Admission::Ok)
    }

    /// Counts one created recording against the current period.
    pub async fn track_recording_created(&self, user_id: UserId) -> Result<(), FlowError> {
        let period = self.app.clock.period();
        debug!(user = %user_id, %period, "tracking created recording");
        self.app
            .subscriptions
            .increment_recordings(user_id, period, self.app.clock.now())
            .await
    }

    /// Relative gauge adjustment, floored at zero in the store.
    pub async fn adjust_concurrent_tasks(&self, user_id: UserId, delta: i64) -> Result<(), FlowError> {
        self.app.subscriptions.adjust_gauge(user_id, delta, self.app.clock.now()).await
    }

    /// Absolute gauge write, floored at zero in the store.
    pub async fn set_concurrent_tasks(&self, user_id: UserId, count: i64) -> Result<(), FlowError> {
        self.app.subscriptions.set_gauge(user_id, count, self.app.clock.now()).await
    }

    /// Full used/limit/available report for the service API.
    pub async fn quota_status(&self, user_id: UserId, user_slug: i64) -> Result<QuotaStatus, FlowError> {
        let quotas = self.effective(user_id).await?;
        let period = self.app.clock.period();

        let recordings_used = self
            .app
            .subscriptions
            .find_usage(user_id, period)
            .await?
            .map(|u| u.recordings_count)
            .unwrap_or(0);
        let tasks_used = self.app.subscriptions.gauge(user_id).await?;
        let jobs_used = self.app.jobs.count_for_user(user_id).await?;
        let storage_used_gb = self.storage_bytes(user_slug).await? as f64 / BYTES_PER_GB as f64;

        Ok(QuotaStatus {
            recordings: ResourceUsage::new(recordings_used, quotas.max_recordings_per_month),
            storage_used_gb,
            storage_limit_gb: quotas.max_storage_gb.as_option(),
            concurrent_tasks: ResourceUsage::new(tasks_used, quotas.max_concurrent_tasks),
            automation_jobs: ResourceUsage::new(jobs_used, quotas.max_automation_jobs),
        })
    }

    async fn storage_bytes(&self, user_slug: i64) -> Result<u64, FlowError> {
        let paths = self.app.paths.clone();
        tokio::task::spawn_blocking(move || paths.user_storage_bytes(user_slug))
            .await
            .map_err(|e| FlowError::internal(format!("storage walk panicked: {}", e)))
    }
}
