// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Automation job persistence. The scheduler is the single writer of
//! `next_run_at`; the trigger path updates run bookkeeping and the next fire
//! time in one statement so a crash between them cannot double-fire a job.

use chrono::{DateTime, Utc};
use mediaflow_domain::{AutomationFilters, AutomationJob, FlowError, Schedule, SyncConfig, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, parse_user_id, unique_or_db};

/// Repository over `automation_jobs`.
#[derive(Clone)]
pub struct AutomationJobRepository {
    pool: SqlitePool,
}

impl AutomationJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, job: &AutomationJob) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO automation_jobs (user_id, name, description, template_ids, schedule, \
             sync_config, filters, processing_config, is_active, last_run_at, next_run_at, \
             run_count, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.user_id.as_string())
        .bind(&job.name)
        .bind(&job.description)
        .bind(serde_json::to_string(&job.template_ids).map_err(FlowError::from)?)
        .bind(serde_json::to_string(&job.schedule).map_err(FlowError::from)?)
        .bind(serde_json::to_string(&job.sync_config).map_err(FlowError::from)?)
        .bind(serde_json::to_string(&job.filters).map_err(FlowError::from)?)
        .bind(job.processing_config.as_ref().map(|v| v.to_string()))
        .bind(job.is_active)
        .bind(job.last_run_at)
        .bind(job.next_run_at)
        .bind(job.run_count)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "automation job"))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, job: &AutomationJob) -> Result<(), FlowError> {
        let result = sqlx::query(
            "UPDATE automation_jobs SET name = ?, description = ?, template_ids = ?, schedule = ?, \
             sync_config = ?, filters = ?, processing_config = ?, is_active = ?, next_run_at = ?, \
             updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(&job.name)
        .bind(&job.description)
        .bind(serde_json::to_string(&job.template_ids).map_err(FlowError::from)?)
        .bind(serde_json::to_string(&job.schedule).map_err(FlowError::from)?)
        .bind(serde_json::to_string(&job.sync_config).map_err(FlowError::from)?)
        .bind(serde_json::to_string(&job.filters).map_err(FlowError::from)?)
        .bind(job.processing_config.as_ref().map(|v| v.to_string()))
        .bind(job.is_active)
        .bind(job.next_run_at)
        .bind(job.updated_at)
        .bind(job.id)
        .bind(job.user_id.as_string())
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "automation job"))?;

        if result.rows_affected() == 0 {
            return Err(FlowError::not_found(format!("automation job {}", job.id)));
        }
        Ok(())
    }

    pub async fn delete(&self, user_id: UserId, id: i64) -> Result<bool, FlowError> {
        let result = sqlx::query("DELETE FROM automation_jobs WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id.as_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_owned(&self, user_id: UserId, id: i64) -> Result<Option<AutomationJob>, FlowError> {
        let row = sqlx::query("SELECT * FROM automation_jobs WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    pub async fn find_by_name(&self, user_id: UserId, name: &str) -> Result<Option<AutomationJob>, FlowError> {
        let row = sqlx::query("SELECT * FROM automation_jobs WHERE user_id = ? AND name = ?")
            .bind(user_id.as_string())
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<AutomationJob>, FlowError> {
        let rows = sqlx::query("SELECT * FROM automation_jobs WHERE user_id = ? ORDER BY id")
            .bind(user_id.as_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn count_for_user(&self, user_id: UserId) -> Result<i64, FlowError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM automation_jobs WHERE user_id = ?")
            .bind(user_id.as_string())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Active jobs whose fire time has arrived, soonest first.
    pub async fn due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<AutomationJob>, FlowError> {
        let rows = sqlx::query(
            "SELECT * FROM automation_jobs \
             WHERE is_active = 1 AND next_run_at IS NOT NULL AND next_run_at <= ? \
             ORDER BY next_run_at ASC LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_job).collect()
    }

    /// One-statement trigger bookkeeping: run counters and the next fire
    /// time move together.
    pub async fn mark_triggered(
        &self,
        id: i64,
        now: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "UPDATE automation_jobs SET last_run_at = ?, run_count = run_count + 1, next_run_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(next_run_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Recomputes the fire time without touching run bookkeeping (inactive
    /// or interval-violating jobs).
    pub async fn set_next_run(&self, id: i64, next_run_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE automation_jobs SET next_run_at = ?, updated_at = ? WHERE id = ?")
            .bind(next_run_at)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_job(row: &SqliteRow) -> Result<AutomationJob, FlowError> {
    let template_ids: Vec<i64> =
        serde_json::from_str(&row.try_get::<String, _>("template_ids").map_err(db_err)?).map_err(FlowError::from)?;
    let schedule: Schedule =
        serde_json::from_str(&row.try_get::<String, _>("schedule").map_err(db_err)?).map_err(FlowError::from)?;
    let sync_config: SyncConfig =
        serde_json::from_str(&row.try_get::<String, _>("sync_config").map_err(db_err)?).map_err(FlowError::from)?;
    let filters: AutomationFilters = match row.try_get::<Option<String>, _>("filters").map_err(db_err)? {
        Some(raw) => serde_json::from_str(&raw).map_err(FlowError::from)?,
        None => AutomationFilters::default(),
    };
    let processing_config = row
        .try_get::<Option<String>, _>("processing_config")
        .map_err(db_err)?
        .map(|raw| serde_json::from_str(&raw).map_err(FlowError::from))
        .transpose()?;

    Ok(AutomationJob {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        template_ids,
        schedule,
        sync_config,
        filters,
        processing_config,
        is_active: row.try_get("is_active").map_err(db_err)?,
        last_run_at: row.try_get("last_run_at").map_err(db_err)?,
        next_run_at: row.try_get("next_run_at").map_err(db_err)?,
        run_count: row.try_get("run_count").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}
