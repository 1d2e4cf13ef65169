// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Janitor
//!
//! Periodic maintenance sweep:
//!
//! - soft-deleted recordings past `hard_delete_at`: purge the recording
//!   directory, then flip the row to `hard_deleted`
//! - `INITIALIZED` recordings idle past the TTL: flip to `EXPIRED`
//! - expired refresh tokens: delete
//! - stages left `IN_PROGRESS` by dead workers: return to `PENDING`
//! - rows hard-deleted long ago: physically remove (cascades take the
//!   stage, target, timing, and metadata rows)
//!
//! Closed-period quota rows are historical and never touched. File purge
//! comes before the durable flip so a crash between the two re-runs the
//! (idempotent) purge instead of leaking files.

use std::sync::Arc;
use std::time::Duration;

use mediaflow_bootstrap::CancellationToken;
use mediaflow_domain::FlowError;
use tracing::{info, warn};

use crate::context::AppContext;

/// Stages untouched this long while `IN_PROGRESS` count as abandoned.
const STALE_STAGE_HOURS: i64 = 1;
/// Hard-deleted rows linger this long before physical removal.
const ROW_PURGE_DAYS: i64 = 7;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub hard_deleted: usize,
    pub expired: u64,
    pub tokens_deleted: u64,
    pub stale_stages_reset: u64,
    pub rows_purged: u64,
}

/// Periodic maintenance worker.
pub struct Janitor {
    app: Arc<AppContext>,
}

impl Janitor {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }

    /// The long-running loop; returns when cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.app.config.retention.janitor_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "janitor started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep().await {
                        Ok(report) if report != SweepReport::default() => {
                            info!(?report, "janitor sweep finished");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "janitor sweep failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("janitor stopping");
                    return;
                }
            }
        }
    }

    /// One full maintenance pass.
    pub async fn sweep(&self) -> Result<SweepReport, FlowError> {
        let now = self.app.clock.now();
        let mut report = SweepReport::default();

        // Soft-deleted recordings whose grace window is over.
        for recording in self.app.recordings.soft_deleted_due(now).await? {
            let Some(user) = self.app.users.find_by_id(recording.user_id).await? else {
                warn!(recording = recording.id, "owner missing, skipping purge");
                continue;
            };

            let paths = self.app.paths.clone();
            let slug = user.user_slug;
            let recording_id = recording.id;
            let purge = tokio::task::spawn_blocking(move || paths.purge_recording_dir(slug, recording_id))
                .await
                .map_err(|e| FlowError::internal(format!("purge task panicked: {}", e)))?;
            if let Err(e) = purge {
                warn!(recording = recording.id, error = %e, "file purge failed, will retry next sweep");
                continue;
            }

            self.app.recordings.mark_hard_deleted(recording.id, now).await?;
            report.hard_deleted += 1;
        }

        // INITIALIZED past the idle TTL.
        let ttl = chrono::Duration::hours(self.app.config.retention.initialized_ttl_hours);
        report.expired = self.app.recordings.expire_initialized(now - ttl, now).await?;

        // Session hygiene.
        report.tokens_deleted = self.app.users.delete_expired_tokens(now).await?;

        // Crash recovery for wedged stages.
        let stale_before = now - chrono::Duration::hours(STALE_STAGE_HOURS);
        report.stale_stages_reset = self.app.stages.reset_stale_in_progress(stale_before, now).await?;

        // Physical row removal, well after the files are gone.
        let purge_before = now - chrono::Duration::days(ROW_PURGE_DAYS);
        report.rows_purged = self.app.recordings.purge_hard_deleted_rows(purge_before).await?;

        Ok(report)
    }
}
