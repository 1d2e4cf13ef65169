// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Recording template persistence. The matcher's candidate ordering is
//! baked into `list_matchable`: active non-drafts only, most-used first,
//! oldest first as the tiebreak.

use chrono::{DateTime, Utc};
use mediaflow_domain::{FlowError, MatchingRules, OutputConfig, RecordingTemplate, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, parse_user_id, unique_or_db};

/// Repository over `recording_templates`.
#[derive(Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, template: &RecordingTemplate) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO recording_templates (user_id, name, description, matching_rules, \
             processing_config, metadata_config, output_config, is_draft, is_active, used_count, \
             last_used_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(template.user_id.as_string())
        .bind(&template.name)
        .bind(&template.description)
        .bind(to_json(&template.matching_rules)?)
        .bind(template.processing_config.as_ref().map(|v| v.to_string()))
        .bind(template.metadata_config.as_ref().map(|v| v.to_string()))
        .bind(to_json(&template.output_config)?)
        .bind(template.is_draft)
        .bind(template.is_active)
        .bind(template.used_count)
        .bind(template.last_used_at)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "template"))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, template: &RecordingTemplate) -> Result<(), FlowError> {
        let result = sqlx::query(
            "UPDATE recording_templates SET name = ?, description = ?, matching_rules = ?, \
             processing_config = ?, metadata_config = ?, output_config = ?, is_draft = ?, \
             is_active = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(&template.name)
        .bind(&template.description)
        .bind(to_json(&template.matching_rules)?)
        .bind(template.processing_config.as_ref().map(|v| v.to_string()))
        .bind(template.metadata_config.as_ref().map(|v| v.to_string()))
        .bind(to_json(&template.output_config)?)
        .bind(template.is_draft)
        .bind(template.is_active)
        .bind(template.updated_at)
        .bind(template.id)
        .bind(template.user_id.as_string())
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "template"))?;

        if result.rows_affected() == 0 {
            return Err(FlowError::not_found(format!("template {}", template.id)));
        }
        Ok(())
    }

    pub async fn find_owned(&self, user_id: UserId, id: i64) -> Result<Option<RecordingTemplate>, FlowError> {
        let row = sqlx::query("SELECT * FROM recording_templates WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_template(&r)).transpose()
    }

    pub async fn find_by_ids(&self, user_id: UserId, ids: &[i64]) -> Result<Vec<RecordingTemplate>, FlowError> {
        let mut templates = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(template) = self.find_owned(user_id, *id).await? {
                templates.push(template);
            }
        }
        Ok(templates)
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<RecordingTemplate>, FlowError> {
        let rows = sqlx::query("SELECT * FROM recording_templates WHERE user_id = ? ORDER BY id")
            .bind(user_id.as_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_template).collect()
    }

    /// Matcher candidates in selection order: active non-drafts, most used
    /// first, oldest first.
    pub async fn list_matchable(&self, user_id: UserId) -> Result<Vec<RecordingTemplate>, FlowError> {
        let rows = sqlx::query(
            "SELECT * FROM recording_templates \
             WHERE user_id = ? AND is_draft = 0 AND is_active = 1 \
             ORDER BY used_count DESC, created_at ASC, id ASC",
        )
        .bind(user_id.as_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_template).collect()
    }

    /// Stamps a successful match.
    pub async fn record_use(&self, id: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE recording_templates SET used_count = used_count + 1, last_used_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, FlowError> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(FlowError::from))
        .transpose()
}

fn from_json<T: serde::de::DeserializeOwned>(text: Option<String>) -> Result<Option<T>, FlowError> {
    text.map(|raw| serde_json::from_str(&raw).map_err(FlowError::from)).transpose()
}

fn row_to_template(row: &SqliteRow) -> Result<RecordingTemplate, FlowError> {
    Ok(RecordingTemplate {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        matching_rules: from_json::<MatchingRules>(row.try_get("matching_rules").map_err(db_err)?)?,
        processing_config: from_json(row.try_get("processing_config").map_err(db_err)?)?,
        metadata_config: from_json(row.try_get("metadata_config").map_err(db_err)?)?,
        output_config: from_json::<OutputConfig>(row.try_get("output_config").map_err(db_err)?)?,
        is_draft: row.try_get("is_draft").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
        used_count: row.try_get("used_count").map_err(db_err)?,
        last_used_at: row.try_get("last_used_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}
