// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Automation Jobs
//!
//! A scheduled application of one or more templates against their sources.
//! The scheduler owns the `next_run_at` column: it is recomputed on create,
//! on update, and after every trigger, and is required to be strictly
//! increasing with a gap no smaller than the tenant's effective
//! `min_automation_interval_hours`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::recording::ProcessingStatus;
use crate::error::FlowError;
use crate::value_objects::{Schedule, UserId};

/// Discovery window configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sync recordings from the last N days (clamped by `last_sync_at`).
    pub sync_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { sync_days: 2 }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), FlowError> {
        if !(1..=30).contains(&self.sync_days) {
            return Err(FlowError::validation(format!(
                "sync_days must be within 1..=30, got {}",
                self.sync_days
            )));
        }
        Ok(())
    }
}

/// Selection filters for recordings the job is allowed to touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationFilters {
    /// Statuses eligible for processing.
    pub status: Vec<ProcessingStatus>,
    /// Skip blank records (too short or too small to be worth processing).
    pub exclude_blank: bool,
}

impl Default for AutomationFilters {
    fn default() -> Self {
        Self {
            status: vec![ProcessingStatus::Initialized],
            exclude_blank: true,
        }
    }
}

impl AutomationFilters {
    /// Whether a recording passes the job's selection filters.
    pub fn selects(&self, status: ProcessingStatus, blank_record: bool) -> bool {
        if self.exclude_blank && blank_record {
            return false;
        }
        self.status.contains(&status)
    }
}

/// Durable scheduled job. Unique by `(user, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationJob {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    /// Templates applied on each run; must be non-empty, active, non-draft.
    pub template_ids: Vec<i64>,
    pub schedule: Schedule,
    pub sync_config: SyncConfig,
    pub filters: AutomationFilters,
    /// Highest-precedence processing overlay for recordings this job touches.
    pub processing_config: Option<Value>,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationJob {
    /// Write-time invariants shared by create and update paths. The
    /// minimum-interval check takes the tenant's effective limit.
    pub fn validate(&self, min_interval_hours: Option<i64>, now: DateTime<Utc>) -> Result<(), FlowError> {
        if self.name.trim().is_empty() || self.name.len() > 200 {
            return Err(FlowError::validation("job name must be 1..=200 characters"));
        }
        if self.template_ids.is_empty() {
            return Err(FlowError::validation("template_ids cannot be empty"));
        }
        self.schedule.validate()?;
        self.sync_config.validate()?;

        if let Some(min_hours) = min_interval_hours {
            if !self.schedule.meets_min_interval(min_hours, now)? {
                return Err(FlowError::validation(format!(
                    "schedule interval must be at least {} hour(s)",
                    min_hours
                )));
            }
        }
        Ok(())
    }

    /// Per-job pipeline concurrency bound, carried inside the processing
    /// override. Absent or non-positive values fall back to the caller's
    /// default.
    pub fn max_parallel(&self) -> Option<usize> {
        self.processing_config
            .as_ref()
            .and_then(|config| config.get("max_parallel"))
            .and_then(Value::as_i64)
            .filter(|n| *n > 0)
            .map(|n| n as usize)
    }

    /// Discovery window start for one source, bounded by the sync horizon.
    pub fn since_for(&self, last_sync_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        let horizon = now - chrono::Duration::days(self.sync_config.sync_days);
        match last_sync_at {
            Some(last) => last.max(horizon),
            None => horizon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(schedule: Schedule) -> AutomationJob {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        AutomationJob {
            id: 1,
            user_id: UserId::generate(),
            name: "nightly".into(),
            description: None,
            template_ids: vec![1],
            schedule,
            sync_config: SyncConfig::default(),
            filters: AutomationFilters::default(),
            processing_config: None,
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 30, 0).unwrap()
    }

    #[test]
    fn test_min_interval_enforced() {
        let two_hourly = job(Schedule::Hours {
            every_n_hours: 2,
            starting_at: 0,
        });
        let err = two_hourly.validate(Some(6), now()).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert!(two_hourly.validate(Some(2), now()).is_ok());
        assert!(two_hourly.validate(None, now()).is_ok());
    }

    #[test]
    fn test_empty_templates_rejected() {
        let mut j = job(Schedule::Hours {
            every_n_hours: 12,
            starting_at: 0,
        });
        j.template_ids.clear();
        assert!(j.validate(None, now()).is_err());
    }

    #[test]
    fn test_sync_days_bounds() {
        assert!(SyncConfig { sync_days: 0 }.validate().is_err());
        assert!(SyncConfig { sync_days: 31 }.validate().is_err());
        assert!(SyncConfig { sync_days: 2 }.validate().is_ok());
    }

    #[test]
    fn test_since_window() {
        let j = job(Schedule::Hours {
            every_n_hours: 12,
            starting_at: 0,
        });
        let now = now();
        let horizon = now - chrono::Duration::days(2);

        // No previous sync: the full horizon.
        assert_eq!(j.since_for(None, now), horizon);

        // Recent sync wins over the horizon.
        let recent = now - chrono::Duration::hours(3);
        assert_eq!(j.since_for(Some(recent), now), recent);

        // Stale sync is clamped to the horizon.
        let stale = now - chrono::Duration::days(10);
        assert_eq!(j.since_for(Some(stale), now), horizon);
    }

    #[test]
    fn test_max_parallel_from_override() {
        let mut j = job(Schedule::Hours {
            every_n_hours: 12,
            starting_at: 0,
        });
        assert_eq!(j.max_parallel(), None);

        j.processing_config = Some(serde_json::json!({ "max_parallel": 5, "auto_upload": true }));
        assert_eq!(j.max_parallel(), Some(5));

        j.processing_config = Some(serde_json::json!({ "max_parallel": 0 }));
        assert_eq!(j.max_parallel(), None);

        j.processing_config = Some(serde_json::json!({ "auto_process": true }));
        assert_eq!(j.max_parallel(), None);
    }

    #[test]
    fn test_filters_selection() {
        let filters = AutomationFilters::default();
        assert!(filters.selects(ProcessingStatus::Initialized, false));
        assert!(!filters.selects(ProcessingStatus::Initialized, true));
        assert!(!filters.selects(ProcessingStatus::Ready, false));
    }
}
