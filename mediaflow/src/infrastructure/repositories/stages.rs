// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Rows and Timings
//!
//! `processing_stages` is unique on `(recording_id, stage_type)` - the
//! serialization point between workers. [`StageRepository::begin`] flips a
//! stage to `IN_PROGRESS` with a guarded conditional update, so only one of
//! two racing workers observes an affected row; the loser gets a
//! `concurrent-stage` conflict.
//!
//! `stage_timings` is append-only: one row per attempt, opened
//! `IN_PROGRESS` and finalized exactly once.

use chrono::{DateTime, Utc};
use mediaflow_domain::{FlowError, ProcessingStage, StageStatus, StageTiming, StageType, UserId};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, json_text, parse_json_text, parse_user_id};

/// Repository over `processing_stages`.
#[derive(Clone)]
pub struct StageRepository {
    pool: SqlitePool,
}

impl StageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, recording_id: i64, stage_type: StageType) -> Result<Option<ProcessingStage>, FlowError> {
        let row = sqlx::query("SELECT * FROM processing_stages WHERE recording_id = ? AND stage_type = ?")
            .bind(recording_id)
            .bind(stage_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_stage(&r)).transpose()
    }

    pub async fn list_for_recording(&self, recording_id: i64) -> Result<Vec<ProcessingStage>, FlowError> {
        let rows = sqlx::query("SELECT * FROM processing_stages WHERE recording_id = ? ORDER BY id")
            .bind(recording_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_stage).collect()
    }

    /// Creates the stage row in `PENDING` if it doesn't exist yet.
    pub async fn ensure_pending(
        &self,
        recording_id: i64,
        user_id: UserId,
        stage_type: StageType,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "INSERT OR IGNORE INTO processing_stages \
             (recording_id, user_id, stage_type, status, retry_count, created_at, updated_at) \
             VALUES (?, ?, ?, 'PENDING', 0, ?, ?)",
        )
        .bind(recording_id)
        .bind(user_id.as_string())
        .bind(stage_type.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Flips the stage to `IN_PROGRESS` and counts the attempt. Guarded: a
    /// stage already in progress is not taken over, the caller gets a
    /// conflict instead.
    pub async fn begin(&self, recording_id: i64, stage_type: StageType, now: DateTime<Utc>) -> Result<(), FlowError> {
        let result = sqlx::query(
            "UPDATE processing_stages SET status = 'IN_PROGRESS', started_at = ?, \
             retry_count = retry_count + 1, updated_at = ? \
             WHERE recording_id = ? AND stage_type = ? AND status != 'IN_PROGRESS'",
        )
        .bind(now)
        .bind(now)
        .bind(recording_id)
        .bind(stage_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(FlowError::conflict(format!(
                "concurrent-stage: {} of recording {} is already in progress",
                stage_type, recording_id
            )));
        }
        Ok(())
    }

    /// Counts one more attempt on a stage that stays `IN_PROGRESS` through
    /// the executor's internal retry loop.
    pub async fn count_attempt(&self, recording_id: i64, stage_type: StageType, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE processing_stages SET retry_count = retry_count + 1, updated_at = ? \
             WHERE recording_id = ? AND stage_type = ?",
        )
        .bind(now)
        .bind(recording_id)
        .bind(stage_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Terminal write: status, completion time, and error/skip fields land
    /// together.
    pub async fn finalize(
        &self,
        recording_id: i64,
        stage_type: StageType,
        status: StageStatus,
        failed_reason: Option<&str>,
        skip_reason: Option<&str>,
        stage_meta: &Value,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        if !status.is_terminal() {
            return Err(FlowError::invariant(format!("finalize with non-terminal status {}", status)));
        }
        let failed = status == StageStatus::Failed;
        sqlx::query(
            "UPDATE processing_stages SET status = ?, completed_at = ?, failed = ?, \
             failed_at = CASE WHEN ? THEN ? ELSE failed_at END, failed_reason = ?, skip_reason = ?, \
             stage_meta = COALESCE(?, stage_meta), updated_at = ? \
             WHERE recording_id = ? AND stage_type = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(failed)
        .bind(failed)
        .bind(now)
        .bind(failed_reason)
        .bind(skip_reason)
        .bind(json_text(stage_meta))
        .bind(now)
        .bind(recording_id)
        .bind(stage_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Crash recovery: stages left `IN_PROGRESS` by a dead worker are
    /// returned to `PENDING` once they go stale, so the uniqueness guard
    /// doesn't wedge the stage forever.
    pub async fn reset_stale_in_progress(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64, FlowError> {
        let result = sqlx::query(
            "UPDATE processing_stages SET status = 'PENDING', updated_at = ? \
             WHERE status = 'IN_PROGRESS' AND updated_at < ?",
        )
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    /// Creates (if needed) and marks a stage `SKIPPED` without running it:
    /// quota denial on an optional path, disabled capability.
    pub async fn mark_skipped(
        &self,
        recording_id: i64,
        user_id: UserId,
        stage_type: StageType,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        self.ensure_pending(recording_id, user_id, stage_type, now).await?;
        self.finalize(recording_id, stage_type, StageStatus::Skipped, None, Some(reason), &Value::Null, now)
            .await
    }
}

/// Repository over the append-only `stage_timings`.
#[derive(Clone)]
pub struct StageTimingRepository {
    pool: SqlitePool,
}

impl StageTimingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a timing row for one attempt; returns its id for finalization.
    pub async fn open(
        &self,
        recording_id: i64,
        user_id: UserId,
        stage_type: StageType,
        substep: Option<&str>,
        attempt: i64,
        started_at: DateTime<Utc>,
    ) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO stage_timings (recording_id, user_id, stage_type, substep, attempt, \
             started_at, status, created_at) VALUES (?, ?, ?, ?, ?, ?, 'IN_PROGRESS', ?)",
        )
        .bind(recording_id)
        .bind(user_id.as_string())
        .bind(stage_type.as_str())
        .bind(substep)
        .bind(attempt)
        .bind(started_at)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    /// Finalizes a timing row exactly once; later calls are ignored.
    pub async fn finalize(
        &self,
        id: i64,
        status: StageStatus,
        error_message: Option<&str>,
        meta: &Value,
        completed_at: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE stage_timings SET completed_at = ?, \
             duration_seconds = (julianday(?) - julianday(started_at)) * 86400.0, \
             status = ?, error_message = ?, meta = ? \
             WHERE id = ? AND completed_at IS NULL",
        )
        .bind(completed_at)
        .bind(completed_at)
        .bind(status.as_str())
        .bind(error_message)
        .bind(json_text(meta))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn list_for_recording(&self, recording_id: i64) -> Result<Vec<StageTiming>, FlowError> {
        let rows = sqlx::query("SELECT * FROM stage_timings WHERE recording_id = ? ORDER BY id")
            .bind(recording_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_timing).collect()
    }

    pub async fn list_for_stage(&self, recording_id: i64, stage_type: StageType) -> Result<Vec<StageTiming>, FlowError> {
        let rows = sqlx::query("SELECT * FROM stage_timings WHERE recording_id = ? AND stage_type = ? ORDER BY id")
            .bind(recording_id)
            .bind(stage_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_timing).collect()
    }
}

fn row_to_stage(row: &SqliteRow) -> Result<ProcessingStage, FlowError> {
    Ok(ProcessingStage {
        id: row.try_get("id").map_err(db_err)?,
        recording_id: row.try_get("recording_id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        stage_type: StageType::parse(&row.try_get::<String, _>("stage_type").map_err(db_err)?)?,
        status: StageStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        completed_at: row.try_get("completed_at").map_err(db_err)?,
        failed: row.try_get("failed").map_err(db_err)?,
        failed_at: row.try_get("failed_at").map_err(db_err)?,
        failed_reason: row.try_get("failed_reason").map_err(db_err)?,
        retry_count: row.try_get("retry_count").map_err(db_err)?,
        skip_reason: row.try_get("skip_reason").map_err(db_err)?,
        stage_meta: parse_json_text(row.try_get("stage_meta").map_err(db_err)?)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_timing(row: &SqliteRow) -> Result<StageTiming, FlowError> {
    Ok(StageTiming {
        id: row.try_get("id").map_err(db_err)?,
        recording_id: row.try_get("recording_id").map_err(db_err)?,
        user_id: row
            .try_get::<Option<String>, _>("user_id")
            .map_err(db_err)?
            .as_deref()
            .map(parse_user_id)
            .transpose()?,
        stage_type: StageType::parse(&row.try_get::<String, _>("stage_type").map_err(db_err)?)?,
        substep: row.try_get("substep").map_err(db_err)?,
        attempt: row.try_get("attempt").map_err(db_err)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        completed_at: row.try_get("completed_at").map_err(db_err)?,
        duration_seconds: row.try_get("duration_seconds").map_err(db_err)?,
        status: StageStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        error_message: row.try_get("error_message").map_err(db_err)?,
        meta: parse_json_text(row.try_get("meta").map_err(db_err)?)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}
