// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Output target persistence. One row per `(recording, platform)`; retries
//! and failure are tracked per target so destinations fail independently.

use chrono::{DateTime, Utc};
use mediaflow_domain::{FlowError, OutputTarget, TargetPlatform, TargetStatus, UserId};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, json_text, parse_json_text, parse_user_id};

/// Repository over `output_targets`.
#[derive(Clone)]
pub struct OutputTargetRepository {
    pool: SqlitePool,
}

impl OutputTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotently materializes the target row for one destination.
    pub async fn ensure(
        &self,
        recording_id: i64,
        user_id: UserId,
        preset_id: i64,
        platform: TargetPlatform,
        now: DateTime<Utc>,
    ) -> Result<OutputTarget, FlowError> {
        sqlx::query(
            "INSERT OR IGNORE INTO output_targets \
             (recording_id, user_id, preset_id, target_type, status, retry_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'NOT_UPLOADED', 0, ?, ?)",
        )
        .bind(recording_id)
        .bind(user_id.as_string())
        .bind(preset_id)
        .bind(platform.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get(recording_id, platform)
            .await?
            .ok_or_else(|| FlowError::invariant(format!("target row vanished for recording {}", recording_id)))
    }

    pub async fn get(&self, recording_id: i64, platform: TargetPlatform) -> Result<Option<OutputTarget>, FlowError> {
        let row = sqlx::query("SELECT * FROM output_targets WHERE recording_id = ? AND target_type = ?")
            .bind(recording_id)
            .bind(platform.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_target(&r)).transpose()
    }

    pub async fn list_for_recording(&self, recording_id: i64) -> Result<Vec<OutputTarget>, FlowError> {
        let rows = sqlx::query("SELECT * FROM output_targets WHERE recording_id = ? ORDER BY id")
            .bind(recording_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_target).collect()
    }

    pub async fn begin_upload(&self, id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE output_targets SET status = 'UPLOADING', started_at = ?, \
             retry_count = retry_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn count_attempt(&self, id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE output_targets SET retry_count = retry_count + 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn mark_uploaded(&self, id: i64, target_meta: &Value, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE output_targets SET status = 'UPLOADED', target_meta = ?, uploaded_at = ?, \
             failed = 0, failed_reason = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(json_text(target_meta))
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, reason: &str, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE output_targets SET status = 'FAILED', failed = 1, failed_at = ?, failed_reason = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_target(row: &SqliteRow) -> Result<OutputTarget, FlowError> {
    Ok(OutputTarget {
        id: row.try_get("id").map_err(db_err)?,
        recording_id: row.try_get("recording_id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        preset_id: row.try_get("preset_id").map_err(db_err)?,
        target_type: TargetPlatform::parse(&row.try_get::<String, _>("target_type").map_err(db_err)?)?,
        status: TargetStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        target_meta: parse_json_text(row.try_get("target_meta").map_err(db_err)?)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        uploaded_at: row.try_get("uploaded_at").map_err(db_err)?,
        failed: row.try_get("failed").map_err(db_err)?,
        failed_at: row.try_get("failed_at").map_err(db_err)?,
        failed_reason: row.try_get("failed_reason").map_err(db_err)?,
        retry_count: row.try_get("retry_count").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}
