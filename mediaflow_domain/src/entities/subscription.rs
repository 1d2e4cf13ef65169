// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Subscriptions and Quota Accounting
//!
//! A tenant optionally holds one [`UserSubscription`] referencing a
//! [`SubscriptionPlan`]. Effective limits resolve per field as
//! `custom override ?? plan default` (a `NULL` plan value means unlimited);
//! tenants without a subscription fall back to the built-in defaults.
//!
//! Monthly counters live in [`QuotaUsage`], one row per `(user, period)`,
//! created lazily on first increment. The here-and-now concurrency count is
//! a per-user [`TaskGauge`], deliberately not periodized: an in-flight task
//! does not stop being in flight at a month boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{EffectiveQuotas, Period, QuotaLimit, UserId};

/// Named subscription tier with default quotas. Admin-managed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub included_recordings_per_month: Option<i64>,
    pub included_storage_gb: Option<i64>,
    pub max_concurrent_tasks: Option<i64>,
    pub max_automation_jobs: Option<i64>,
    pub min_automation_interval_hours: Option<i64>,
    pub is_active: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-tenant subscription; unique per user. `custom_*` fields override the
/// plan defaults field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: i64,
    pub user_id: UserId,
    pub plan_id: i64,
    pub custom_max_recordings_per_month: Option<i64>,
    pub custom_max_storage_gb: Option<i64>,
    pub custom_max_concurrent_tasks: Option<i64>,
    pub custom_max_automation_jobs: Option<i64>,
    pub custom_min_automation_interval_hours: Option<i64>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    /// Resolves the effective limits against the referenced plan.
    ///
    /// Per field: custom override if set, else the plan default; a `NULL`
    /// plan value means unlimited.
    pub fn effective_with(&self, plan: &SubscriptionPlan) -> EffectiveQuotas {
        fn resolve(custom: Option<i64>, plan_value: Option<i64>) -> QuotaLimit {
            QuotaLimit::from_option(custom.or(plan_value))
        }

        EffectiveQuotas {
            max_recordings_per_month: resolve(
                self.custom_max_recordings_per_month,
                plan.included_recordings_per_month,
            ),
            max_storage_gb: resolve(self.custom_max_storage_gb, plan.included_storage_gb),
            max_concurrent_tasks: resolve(self.custom_max_concurrent_tasks, plan.max_concurrent_tasks),
            max_automation_jobs: resolve(self.custom_max_automation_jobs, plan.max_automation_jobs),
            min_automation_interval_hours: resolve(
                self.custom_min_automation_interval_hours,
                plan.min_automation_interval_hours,
            ),
        }
    }
}

/// Monthly usage counters for one `(user, period)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub id: i64,
    pub user_id: UserId,
    pub period: Period,
    pub recordings_count: i64,
    /// Accrued overage, in integer cents.
    pub overage_cost_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user concurrency gauge. Invariant: `concurrent_tasks_count >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGauge {
    pub user_id: UserId,
    pub concurrent_tasks_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan() -> SubscriptionPlan {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        SubscriptionPlan {
            id: 1,
            name: "pro".into(),
            display_name: "Pro".into(),
            description: None,
            included_recordings_per_month: Some(100),
            included_storage_gb: Some(50),
            max_concurrent_tasks: Some(4),
            max_automation_jobs: None,
            min_automation_interval_hours: Some(6),
            is_active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn subscription() -> UserSubscription {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        UserSubscription {
            id: 1,
            user_id: UserId::generate(),
            plan_id: 1,
            custom_max_recordings_per_month: None,
            custom_max_storage_gb: Some(200),
            custom_max_concurrent_tasks: None,
            custom_max_automation_jobs: None,
            custom_min_automation_interval_hours: None,
            starts_at: now,
            expires_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_custom_override_wins() {
        let effective = subscription().effective_with(&plan());
        assert_eq!(effective.max_storage_gb, QuotaLimit::Limited(200));
        assert_eq!(effective.max_recordings_per_month, QuotaLimit::Limited(100));
    }

    #[test]
    fn test_null_plan_field_means_unlimited() {
        let effective = subscription().effective_with(&plan());
        assert_eq!(effective.max_automation_jobs, QuotaLimit::Unlimited);
    }
}
