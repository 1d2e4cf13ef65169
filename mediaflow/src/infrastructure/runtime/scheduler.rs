// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Automation Scheduler
//!
//! Interval-polled tick loop over the durable schedule rows. Each tick
//! pulls the due active jobs (soonest `next_run_at` first) and, per job:
//!
//! 1. re-verifies `is_active` (it may have flipped since the query),
//! 2. re-verifies the tenant's minimum automation interval - a job whose
//!    observed cron gap undercuts it is skipped and rescheduled, not run,
//! 3. marks the trigger (run bookkeeping + the next fire time in one
//!    statement) *before* executing, so a crash mid-run cannot double-fire.
//!
//! The scheduler is the single writer of `next_run_at`; consecutive values
//! for one job are strictly increasing by construction (each is computed
//! strictly after the previous fire time).

use std::sync::Arc;
use std::time::Duration;

use mediaflow_bootstrap::CancellationToken;
use mediaflow_domain::{AutomationJob, FlowError};
use tracing::{debug, info, warn};

use crate::application::services::automation::AutomationService;
use crate::application::services::quota_ledger::QuotaLedger;
use crate::context::AppContext;

/// Jobs pulled per tick; anything beyond waits for the next tick.
const DUE_JOBS_PER_TICK: i64 = 16;

/// Durable cron scheduler over automation jobs.
pub struct AutomationScheduler {
    app: Arc<AppContext>,
    automation: AutomationService,
    ledger: QuotaLedger,
}

impl AutomationScheduler {
    pub fn new(app: Arc<AppContext>, automation: AutomationService, ledger: QuotaLedger) -> Self {
        Self { app, automation, ledger }
    }

    /// The long-running loop; returns when cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let tick = Duration::from_secs(self.app.config.scheduler.tick_secs.max(1));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(tick_secs = tick.as_secs(), "automation scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(&cancel).await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("automation scheduler stopping");
                    return;
                }
            }
        }
    }

    /// One scheduling pass. Returns the number of jobs triggered.
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<usize, FlowError> {
        let now = self.app.clock.now();
        let due = self.app.jobs.due_jobs(now, DUE_JOBS_PER_TICK).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(due = due.len(), "due jobs this tick");

        let mut triggered = 0;
        for job in due {
            if cancel.is_cancelled() {
                break;
            }
            if self.trigger_one(&job, cancel).await? {
                triggered += 1;
            }
        }
        Ok(triggered)
    }

    /// Handles one due job; returns whether it actually ran.
    async fn trigger_one(&self, job: &AutomationJob, cancel: &CancellationToken) -> Result<bool, FlowError> {
        let now = self.app.clock.now();
        let next = job.schedule.next_fire_after(now)?;

        if !job.is_active {
            self.app.jobs.set_next_run(job.id, next, now).await?;
            return Ok(false);
        }

        // The tenant's minimum interval may have tightened since the job
        // was written; a violating job is skipped, not run.
        let quotas = self.ledger.effective(job.user_id).await?;
        if let Some(min_hours) = quotas.min_automation_interval_hours.as_option() {
            if !job.schedule.meets_min_interval(min_hours, now)? {
                warn!(
                    job = job.id,
                    min_hours,
                    "job schedule violates the minimum automation interval, skipping"
                );
                self.app.jobs.set_next_run(job.id, next, now).await?;
                return Ok(false);
            }
        }

        // Trigger bookkeeping lands before execution: a crash mid-run moves
        // the job forward instead of double-firing it.
        self.app.jobs.mark_triggered(job.id, now, next).await?;
        self.app.metrics.record_job_triggered();
        info!(job = job.id, next_run = ?next, "job triggered");

        if let Err(e) = self.automation.run_job(job, cancel).await {
            warn!(job = job.id, error = %e, "job run failed");
        }
        Ok(true)
    }
}
