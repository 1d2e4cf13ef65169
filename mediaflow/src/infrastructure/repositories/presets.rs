// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Output preset persistence.

use mediaflow_domain::{FlowError, OutputPreset, TargetPlatform, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, json_text, parse_json_text, parse_user_id, unique_or_db};

/// Repository over `output_presets`.
#[derive(Clone)]
pub struct OutputPresetRepository {
    pool: SqlitePool,
}

impl OutputPresetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, preset: &OutputPreset) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO output_presets (user_id, name, description, platform, credential_id, \
             preset_metadata, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(preset.user_id.as_string())
        .bind(&preset.name)
        .bind(&preset.description)
        .bind(preset.platform.as_str())
        .bind(preset.credential_id)
        .bind(json_text(&preset.preset_metadata))
        .bind(preset.is_active)
        .bind(preset.created_at)
        .bind(preset.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "output preset"))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_owned(&self, user_id: UserId, id: i64) -> Result<Option<OutputPreset>, FlowError> {
        let row = sqlx::query("SELECT * FROM output_presets WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_preset(&r)).transpose()
    }

    /// Resolves a preset-id list, keeping input order and skipping unknown
    /// or foreign ids.
    pub async fn list_by_ids(&self, user_id: UserId, ids: &[i64]) -> Result<Vec<OutputPreset>, FlowError> {
        let mut presets = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(preset) = self.find_owned(user_id, *id).await? {
                presets.push(preset);
            }
        }
        Ok(presets)
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OutputPreset>, FlowError> {
        let rows = sqlx::query("SELECT * FROM output_presets WHERE user_id = ? ORDER BY id")
            .bind(user_id.as_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_preset).collect()
    }
}

fn row_to_preset(row: &SqliteRow) -> Result<OutputPreset, FlowError> {
    Ok(OutputPreset {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        platform: TargetPlatform::parse(&row.try_get::<String, _>("platform").map_err(db_err)?)?,
        credential_id: row.try_get("credential_id").map_err(db_err)?,
        preset_metadata: parse_json_text(row.try_get("preset_metadata").map_err(db_err)?)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}
