// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Discovery
//!
//! Pulls candidate recordings from a source adapter and reconciles them
//! against the store. Idempotent by construction: the `(user, source_type,
//! source_key)` dedup lookup makes a re-run of the same window a no-op for
//! candidates that already exist, and quota denial is counted per candidate
//! without creating anything.
//!
//! Discovery never mutates other recordings; its only side effects are new
//! recording + metadata rows, `PENDING_SOURCE → INITIALIZED` finalization,
//! the quota counter, and the source's sync bookkeeping (which advances on
//! success *and* failure, with the error recorded).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mediaflow_domain::services::{CandidateRecording, ListFilters};
use mediaflow_domain::{
    DeleteState, FlowError, InputSource, ProcessingStatus, Recording, SourceMetadata,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::application::services::quota_ledger::QuotaLedger;
use crate::context::AppContext;

/// Outcome counts of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub found: usize,
    pub created: usize,
    pub already_present: usize,
    pub finalized: usize,
    pub quota_denied: usize,
    pub skipped_blank: usize,
    /// Candidates whose prior recording is hard-deleted but not yet purged.
    pub skipped_deleted: usize,
    /// IDs of recordings created by this pass, in listing order.
    pub created_ids: Vec<i64>,
}

/// Discovery service over the registered source adapters.
#[derive(Clone)]
pub struct SourceDiscovery {
    app: Arc<AppContext>,
    ledger: QuotaLedger,
}

impl SourceDiscovery {
    pub fn new(app: Arc<AppContext>, ledger: QuotaLedger) -> Self {
        Self { app, ledger }
    }

    /// Runs one discovery window against one source.
    pub async fn sync_source(
        &self,
        source: &InputSource,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        filters: &ListFilters,
    ) -> Result<SyncReport, FlowError> {
        let Some(adapter) = self.app.source_adapter(source.source_type) else {
            let reason = format!("no source adapter registered for {}", source.source_type);
            self.app.sources.record_sync(source.id, self.app.clock.now(), Some(&reason)).await?;
            return Err(FlowError::fatal_external(reason));
        };

        let candidates = match adapter.list(source, since, until, filters).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(source = source.id, error = %e, "source listing failed");
                self.app
                    .sources
                    .record_sync(source.id, self.app.clock.now(), Some(&e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        let mut report = SyncReport {
            found: candidates.len(),
            ..SyncReport::default()
        };

        for candidate in &candidates {
            self.reconcile_candidate(source, candidate, &mut report).await?;
        }

        self.app.sources.record_sync(source.id, self.app.clock.now(), None).await?;
        self.app.metrics.record_discovered(report.created as u64);

        info!(
            source = source.id,
            found = report.found,
            created = report.created,
            existing = report.already_present,
            quota_denied = report.quota_denied,
            "discovery pass finished"
        );
        Ok(report)
    }

    async fn reconcile_candidate(
        &self,
        source: &InputSource,
        candidate: &CandidateRecording,
        report: &mut SyncReport,
    ) -> Result<(), FlowError> {
        let existing = self
            .app
            .source_meta
            .find_recording_by_key(source.user_id, source.source_type, &candidate.source_key)
            .await?;

        if let Some(matched) = existing {
            // A hard-deleted match is skipped outright until its row is
            // physically purged; re-creating it here would duplicate the
            // source key and burn a quota slot.
            if matched.hard_deleted {
                debug!(
                    source = source.id,
                    key = %candidate.source_key,
                    recording = matched.recording_id,
                    "candidate matches a hard-deleted recording, skipping"
                );
                report.skipped_deleted += 1;
                return Ok(());
            }

            let recording_id = matched.recording_id;
            report.already_present += 1;
            // A parked candidate whose platform finished assembling the
            // media moves to the starting line.
            if candidate.finalized {
                let Some(recording) = self.app.recordings.find(recording_id).await? else {
                    return Ok(());
                };
                if recording.status == ProcessingStatus::PendingSource {
                    if self.app.recordings.finalize_source(recording_id, self.app.clock.now()).await? {
                        report.finalized += 1;
                        debug!(recording = recording_id, "source finalized");
                    }
                }
            }
            return Ok(());
        }

        let admission = self.ledger.check_recordings(source.user_id).await?;
        if let Some(reason) = admission.reason() {
            debug!(source = source.id, key = %candidate.source_key, %reason, "candidate denied by quota");
            self.app.metrics.record_quota_denial();
            report.quota_denied += 1;
            return Ok(());
        }

        let recording_id = self.create_recording(source, candidate).await?;
        self.ledger.track_recording_created(source.user_id).await?;
        report.created += 1;
        report.created_ids.push(recording_id);
        if candidate.blank {
            report.skipped_blank += 1;
        }
        Ok(())
    }

    async fn create_recording(&self, source: &InputSource, candidate: &CandidateRecording) -> Result<i64, FlowError> {
        let now = self.app.clock.now();

        // Conference-cloud listings report minutes; everything downstream
        // is seconds.
        let duration_seconds = if source.source_type.reports_duration_in_minutes() {
            candidate.duration * 60.0
        } else {
            candidate.duration
        };

        // Sources that can't report a duration send 0; only a positive
        // too-short duration marks a blank record.
        let blank = candidate.blank
            || (duration_seconds > 0.0 && duration_seconds < self.app.config.stages.blank_min_duration_seconds);
        let status = if blank {
            ProcessingStatus::Skipped
        } else if candidate.finalized {
            ProcessingStatus::Initialized
        } else {
            ProcessingStatus::PendingSource
        };
        let expire_at = (status == ProcessingStatus::Initialized)
            .then(|| now + chrono::Duration::hours(self.app.config.retention.initialized_ttl_hours));

        let recording = Recording {
            id: 0,
            user_id: source.user_id,
            input_source_id: Some(source.id),
            template_id: None,
            display_name: candidate.display_name.clone(),
            start_time: candidate.start_time,
            duration_seconds,
            status,
            is_mapped: false,
            blank_record: blank,
            expire_at,
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
            video_file_size: candidate.size_bytes,
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
        };
        let recording_id = self.app.recordings.create(&recording).await?;

        let metadata = json!({
            "size_bytes": candidate.size_bytes,
            "raw": candidate.raw,
        });
        self.app
            .source_meta
            .insert(&SourceMetadata {
                id: 0,
                recording_id,
                user_id: source.user_id,
                input_source_id: Some(source.id),
                source_type: source.source_type,
                source_key: candidate.source_key.clone(),
                metadata,
            })
            .await?;

        debug!(
            recording = recording_id,
            key = %candidate.source_key,
            status = %status,
            "recording created from candidate"
        );
        Ok(recording_id)
    }
}
