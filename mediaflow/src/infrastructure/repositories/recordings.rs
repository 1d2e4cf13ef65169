// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recording Store
//!
//! Durable CRUD over recordings with the store-level invariants enforced
//! here rather than in callers:
//!
//! - creation always lands in `INITIALIZED` (or `PENDING_SOURCE`), active,
//!   `retry_count = 0`, with no stage rows
//! - default reads exclude `hard_deleted` rows; admin paths opt in
//!   explicitly via the `_any` variants
//! - soft delete stamps both deletion timestamps in one statement
//! - `mark_failure` writes the failure fields and the rolled-back status
//!   together
//!
//! File removal is never done here; the janitor owns the filesystem side of
//! deletion.

use chrono::{DateTime, Utc};
use mediaflow_domain::{
    DeleteState, DeletionReason, FlowError, ProcessingStatus, Recording, UserId,
};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, json_text, parse_json_text, parse_user_id};

/// Repository over `recordings`.
#[derive(Clone)]
pub struct RecordingRepository {
    pool: SqlitePool,
}

impl RecordingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a freshly discovered recording; `recording.id` is ignored and
    /// the allocated id returned. Status must be a creation status.
    pub async fn create(&self, recording: &Recording) -> Result<i64, FlowError> {
        if !matches!(
            recording.status,
            ProcessingStatus::Initialized | ProcessingStatus::PendingSource | ProcessingStatus::Skipped
        ) {
            return Err(FlowError::invariant(format!(
                "recordings are created in INITIALIZED, PENDING_SOURCE or SKIPPED, not {}",
                recording.status
            )));
        }

        let result = sqlx::query(
            "INSERT INTO recordings (user_id, input_source_id, template_id, display_name, start_time, \
             duration_seconds, status, is_mapped, blank_record, expire_at, delete_state, deletion_reason, \
             soft_deleted_at, hard_delete_at, on_pause, pause_requested_at, local_video_path, \
             processed_video_path, processed_audio_path, transcription_dir, downloaded_at, video_file_size, \
             processing_preferences, failed, failed_at, failed_reason, failed_at_stage, retry_count, \
             pipeline_started_at, pipeline_completed_at, pipeline_duration_seconds, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(recording.user_id.as_string())
        .bind(recording.input_source_id)
        .bind(recording.template_id)
        .bind(&recording.display_name)
        .bind(recording.start_time)
        .bind(recording.duration_seconds)
        .bind(recording.status.as_str())
        .bind(recording.is_mapped)
        .bind(recording.blank_record)
        .bind(recording.expire_at)
        .bind(recording.delete_state.as_str())
        .bind(recording.deletion_reason.map(|r| r.as_str()))
        .bind(recording.soft_deleted_at)
        .bind(recording.hard_delete_at)
        .bind(recording.on_pause)
        .bind(recording.pause_requested_at)
        .bind(&recording.local_video_path)
        .bind(&recording.processed_video_path)
        .bind(&recording.processed_audio_path)
        .bind(&recording.transcription_dir)
        .bind(recording.downloaded_at)
        .bind(recording.video_file_size)
        .bind(json_text(&recording.processing_preferences))
        .bind(recording.failed)
        .bind(recording.failed_at)
        .bind(&recording.failed_reason)
        .bind(&recording.failed_at_stage)
        .bind(recording.pipeline_started_at)
        .bind(recording.pipeline_completed_at)
        .bind(recording.pipeline_duration_seconds)
        .bind(recording.created_at)
        .bind(recording.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    /// Default read: hard-deleted rows are invisible.
    pub async fn find(&self, id: i64) -> Result<Option<Recording>, FlowError> {
        let row = sqlx::query("SELECT * FROM recordings WHERE id = ? AND delete_state != 'hard_deleted'")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_recording(&r)).transpose()
    }

    /// Admin read including hard-deleted rows.
    pub async fn find_any(&self, id: i64) -> Result<Option<Recording>, FlowError> {
        let row = sqlx::query("SELECT * FROM recordings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_recording(&r)).transpose()
    }

    pub async fn find_owned(&self, user_id: UserId, id: i64) -> Result<Option<Recording>, FlowError> {
        let row = sqlx::query(
            "SELECT * FROM recordings WHERE id = ? AND user_id = ? AND delete_state != 'hard_deleted'",
        )
        .bind(id)
        .bind(user_id.as_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|r| row_to_recording(&r)).transpose()
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Recording>, FlowError> {
        let rows = sqlx::query(
            "SELECT * FROM recordings WHERE user_id = ? AND delete_state != 'hard_deleted' ORDER BY id",
        )
        .bind(user_id.as_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_recording).collect()
    }

    /// Automation selection: active recordings of one user in any of the
    /// given statuses.
    pub async fn list_by_statuses(
        &self,
        user_id: UserId,
        statuses: &[ProcessingStatus],
    ) -> Result<Vec<Recording>, FlowError> {
        let mut recordings = Vec::new();
        for status in statuses {
            let rows = sqlx::query(
                "SELECT * FROM recordings WHERE user_id = ? AND status = ? AND delete_state = 'active' ORDER BY id",
            )
            .bind(user_id.as_string())
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            for row in &rows {
                recordings.push(row_to_recording(row)?);
            }
        }
        recordings.sort_by_key(|r| r.id);
        recordings.dedup_by_key(|r| r.id);
        Ok(recordings)
    }

    pub async fn update_status(&self, id: i64, status: ProcessingStatus, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE recordings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Failure fields and the rolled-back status move in one statement.
    pub async fn mark_failure(
        &self,
        id: i64,
        reason: &str,
        rollback_to: ProcessingStatus,
        at_stage: &str,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recordings SET failed = 1, failed_reason = ?, failed_at_stage = ?, failed_at = ?, \
             status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(reason)
        .bind(at_stage)
        .bind(now)
        .bind(rollback_to.as_str())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Records why advancement stopped without failing the recording
    /// (quota denial on the required path).
    pub async fn set_block_reason(&self, id: i64, reason: &str, at_stage: &str, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE recordings SET failed_reason = ?, failed_at_stage = ?, updated_at = ? WHERE id = ?")
            .bind(reason)
            .bind(at_stage)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn clear_failure(&self, id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recordings SET failed = 0, failed_reason = NULL, failed_at_stage = NULL, failed_at = NULL, \
             updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn soft_delete(
        &self,
        id: i64,
        reason: DeletionReason,
        now: DateTime<Utc>,
        hard_delete_at: DateTime<Utc>,
    ) -> Result<bool, FlowError> {
        let result = sqlx::query(
            "UPDATE recordings SET delete_state = 'soft_deleted', deletion_reason = ?, soft_deleted_at = ?, \
             hard_delete_at = ?, updated_at = ? WHERE id = ? AND delete_state = 'active'",
        )
        .bind(reason.as_str())
        .bind(now)
        .bind(hard_delete_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_hard_deleted(&self, id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE recordings SET delete_state = 'hard_deleted', updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Physical row removal for rows hard-deleted before the cutoff; stage
    /// rows, targets, timings, and metadata go with them via cascade.
    pub async fn purge_hard_deleted_rows(&self, before: DateTime<Utc>) -> Result<u64, FlowError> {
        let result = sqlx::query("DELETE FROM recordings WHERE delete_state = 'hard_deleted' AND updated_at < ?")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    /// Janitor scan: soft-deleted rows whose hard-delete time has arrived.
    pub async fn soft_deleted_due(&self, now: DateTime<Utc>) -> Result<Vec<Recording>, FlowError> {
        let rows = sqlx::query(
            "SELECT * FROM recordings WHERE delete_state = 'soft_deleted' AND hard_delete_at IS NOT NULL \
             AND hard_delete_at <= ? ORDER BY hard_delete_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_recording).collect()
    }

    /// Janitor sweep: INITIALIZED recordings idle past the TTL flip to
    /// EXPIRED. Returns the number expired.
    pub async fn expire_initialized(&self, created_before: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64, FlowError> {
        let result = sqlx::query(
            "UPDATE recordings SET status = 'EXPIRED', updated_at = ? \
             WHERE status = 'INITIALIZED' AND delete_state = 'active' AND created_at < ?",
        )
        .bind(now)
        .bind(created_before)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    pub async fn set_pause(&self, id: i64, on_pause: bool, now: DateTime<Utc>) -> Result<(), FlowError> {
        let pause_requested_at = if on_pause { Some(now) } else { None };
        sqlx::query("UPDATE recordings SET on_pause = ?, pause_requested_at = ?, updated_at = ? WHERE id = ?")
            .bind(on_pause)
            .bind(pause_requested_at)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_download_result(
        &self,
        id: i64,
        local_video_path: &str,
        video_file_size: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recordings SET local_video_path = ?, video_file_size = ?, downloaded_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(local_video_path)
        .bind(video_file_size)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_processed_paths(
        &self,
        id: i64,
        processed_video_path: Option<&str>,
        processed_audio_path: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recordings SET \
               processed_video_path = COALESCE(?, processed_video_path), \
               processed_audio_path = COALESCE(?, processed_audio_path), \
               updated_at = ? WHERE id = ?",
        )
        .bind(processed_video_path)
        .bind(processed_audio_path)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_transcription_dir(&self, id: i64, dir: &str, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE recordings SET transcription_dir = ?, updated_at = ? WHERE id = ?")
            .bind(dir)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Replaces the merged preferences and (optionally) the applied
    /// template reference.
    pub async fn apply_preferences(
        &self,
        id: i64,
        preferences: &Value,
        template_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recordings SET processing_preferences = ?, \
               template_id = COALESCE(?, template_id), \
               is_mapped = CASE WHEN ? IS NULL THEN is_mapped ELSE 1 END, \
               updated_at = ? WHERE id = ?",
        )
        .bind(json_text(preferences))
        .bind(template_id)
        .bind(template_id)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Stamps the pipeline start exactly once.
    pub async fn stamp_pipeline_started(&self, id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recordings SET pipeline_started_at = ?, updated_at = ? \
             WHERE id = ? AND pipeline_started_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Stamps pipeline completion and the derived duration exactly once.
    pub async fn stamp_pipeline_completed(&self, id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recordings SET pipeline_completed_at = ?, \
               pipeline_duration_seconds = CASE WHEN pipeline_started_at IS NULL THEN NULL \
                 ELSE (julianday(?) - julianday(pipeline_started_at)) * 86400.0 END, \
               updated_at = ? \
             WHERE id = ? AND pipeline_completed_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn finalize_source(&self, id: i64, now: DateTime<Utc>) -> Result<bool, FlowError> {
        let result = sqlx::query(
            "UPDATE recordings SET status = 'INITIALIZED', updated_at = ? \
             WHERE id = ? AND status = 'PENDING_SOURCE'",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_recording(row: &SqliteRow) -> Result<Recording, FlowError> {
    Ok(Recording {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        input_source_id: row.try_get("input_source_id").map_err(db_err)?,
        template_id: row.try_get("template_id").map_err(db_err)?,
        display_name: row.try_get("display_name").map_err(db_err)?,
        start_time: row.try_get("start_time").map_err(db_err)?,
        duration_seconds: row.try_get("duration_seconds").map_err(db_err)?,
        status: ProcessingStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        is_mapped: row.try_get("is_mapped").map_err(db_err)?,
        blank_record: row.try_get("blank_record").map_err(db_err)?,
        expire_at: row.try_get("expire_at").map_err(db_err)?,
        delete_state: DeleteState::parse(&row.try_get::<String, _>("delete_state").map_err(db_err)?)?,
        deletion_reason: row
            .try_get::<Option<String>, _>("deletion_reason")
            .map_err(db_err)?
            .map(|r| DeletionReason::parse(&r))
            .transpose()?,
        soft_deleted_at: row.try_get("soft_deleted_at").map_err(db_err)?,
        hard_delete_at: row.try_get("hard_delete_at").map_err(db_err)?,
        on_pause: row.try_get("on_pause").map_err(db_err)?,
        pause_requested_at: row.try_get("pause_requested_at").map_err(db_err)?,
        local_video_path: row.try_get("local_video_path").map_err(db_err)?,
        processed_video_path: row.try_get("processed_video_path").map_err(db_err)?,
        processed_audio_path: row.try_get("processed_audio_path").map_err(db_err)?,
        transcription_dir: row.try_get("transcription_dir").map_err(db_err)?,
        downloaded_at: row.try_get("downloaded_at").map_err(db_err)?,
        video_file_size: row.try_get("video_file_size").map_err(db_err)?,
        processing_preferences: parse_json_text(row.try_get("processing_preferences").map_err(db_err)?)?,
        failed: row.try_get("failed").map_err(db_err)?,
        failed_at: row.try_get("failed_at").map_err(db_err)?,
        failed_reason: row.try_get("failed_reason").map_err(db_err)?,
        failed_at_stage: row.try_get("failed_at_stage").map_err(db_err)?,
        retry_count: row.try_get("retry_count").map_err(db_err)?,
        pipeline_started_at: row.try_get("pipeline_started_at").map_err(db_err)?,
        pipeline_completed_at: row.try_get("pipeline_completed_at").map_err(db_err)?,
        pipeline_duration_seconds: row.try_get("pipeline_duration_seconds").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}
