// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Input-source bindings and per-recording source metadata. The metadata
//! table carries the dedup key: `(source_type, source_key)` is unique per
//! user across non-hard-deleted recordings, enforced by the lookup in
//! [`SourceMetadataRepository::find_recording_by_key`].

use chrono::{DateTime, Utc};
use mediaflow_domain::{FlowError, InputSource, SourceMetadata, SourceType, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, json_text, parse_json_text, parse_user_id, unique_or_db};

/// Repository over `input_sources`.
#[derive(Clone)]
pub struct InputSourceRepository {
    pool: SqlitePool,
}

impl InputSourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, source: &InputSource) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO input_sources (user_id, name, description, source_type, credential_id, \
             config, is_active, last_sync_at, last_sync_error, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(source.user_id.as_string())
        .bind(&source.name)
        .bind(&source.description)
        .bind(source.source_type.as_str())
        .bind(source.credential_id)
        .bind(json_text(&source.config))
        .bind(source.is_active)
        .bind(source.last_sync_at)
        .bind(&source.last_sync_error)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "input source"))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_owned(&self, user_id: UserId, id: i64) -> Result<Option<InputSource>, FlowError> {
        let row = sqlx::query("SELECT * FROM input_sources WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_source(&r)).transpose()
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<InputSource>, FlowError> {
        let rows = sqlx::query("SELECT * FROM input_sources WHERE user_id = ? ORDER BY id")
            .bind(user_id.as_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_source).collect()
    }

    pub async fn list_by_ids(&self, user_id: UserId, ids: &[i64]) -> Result<Vec<InputSource>, FlowError> {
        let mut sources = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(source) = self.find_owned(user_id, *id).await? {
                sources.push(source);
            }
        }
        Ok(sources)
    }

    /// Discovery bookkeeping: `last_sync_at` is always advanced; the error
    /// column is set on failure and cleared on success.
    pub async fn record_sync(&self, id: i64, at: DateTime<Utc>, error: Option<&str>) -> Result<(), FlowError> {
        sqlx::query("UPDATE input_sources SET last_sync_at = ?, last_sync_error = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(error)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

/// Result of the source-key dedup lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceKeyMatch {
    pub recording_id: i64,
    /// The matched recording is hard-deleted but not yet physically purged.
    pub hard_deleted: bool,
}

/// Repository over `source_metadata`.
#[derive(Clone)]
pub struct SourceMetadataRepository {
    pool: SqlitePool,
}

impl SourceMetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, meta: &SourceMetadata) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO source_metadata (recording_id, user_id, input_source_id, source_type, source_key, metadata) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(meta.recording_id)
        .bind(meta.user_id.as_string())
        .bind(meta.input_source_id)
        .bind(meta.source_type.as_str())
        .bind(&meta.source_key)
        .bind(json_text(&meta.metadata))
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "source metadata"))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_recording(&self, recording_id: i64) -> Result<Option<SourceMetadata>, FlowError> {
        let row = sqlx::query("SELECT * FROM source_metadata WHERE recording_id = ?")
            .bind(recording_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_meta(&r)).transpose()
    }

    /// Dedup lookup: the recording (if any) already holding this source key
    /// for this user. Hard-deleted rows still match until their physical
    /// purge - the caller must treat that case as "skip", not "missing" -
    /// so the flag rides along. Live rows win when both exist.
    pub async fn find_recording_by_key(
        &self,
        user_id: UserId,
        source_type: SourceType,
        source_key: &str,
    ) -> Result<Option<SourceKeyMatch>, FlowError> {
        let row = sqlx::query(
            "SELECT sm.recording_id, r.delete_state FROM source_metadata sm \
             JOIN recordings r ON r.id = sm.recording_id \
             WHERE sm.user_id = ? AND sm.source_type = ? AND sm.source_key = ? \
             ORDER BY CASE WHEN r.delete_state = 'hard_deleted' THEN 1 ELSE 0 END, sm.recording_id \
             LIMIT 1",
        )
        .bind(user_id.as_string())
        .bind(source_type.as_str())
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| {
            let delete_state: String = r.try_get("delete_state").map_err(db_err)?;
            Ok(SourceKeyMatch {
                recording_id: r.try_get("recording_id").map_err(db_err)?,
                hard_deleted: delete_state == "hard_deleted",
            })
        })
        .transpose()
    }
}

fn row_to_source(row: &SqliteRow) -> Result<InputSource, FlowError> {
    Ok(InputSource {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        source_type: SourceType::parse(&row.try_get::<String, _>("source_type").map_err(db_err)?)?,
        credential_id: row.try_get("credential_id").map_err(db_err)?,
        config: parse_json_text(row.try_get("config").map_err(db_err)?)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
        last_sync_at: row.try_get("last_sync_at").map_err(db_err)?,
        last_sync_error: row.try_get("last_sync_error").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_meta(row: &SqliteRow) -> Result<SourceMetadata, FlowError> {
    Ok(SourceMetadata {
        id: row.try_get("id").map_err(db_err)?,
        recording_id: row.try_get("recording_id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        input_source_id: row.try_get("input_source_id").map_err(db_err)?,
        source_type: SourceType::parse(&row.try_get::<String, _>("source_type").map_err(db_err)?)?,
        source_key: row.try_get("source_key").map_err(db_err)?,
        metadata: parse_json_text(row.try_get("metadata").map_err(db_err)?)?,
    })
}
