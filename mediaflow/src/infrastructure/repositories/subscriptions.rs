// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Subscription and Quota Persistence
//!
//! Plans, per-user subscriptions, the lazy monthly usage rows, and the
//! per-user concurrency gauge. The gauge mutations are single-statement
//! upserts with a `MAX(0, …)` floor so concurrent adjustments stay atomic
//! and the non-negative invariant holds at every observable point.

use chrono::{DateTime, Utc};
use mediaflow_domain::{FlowError, Period, QuotaUsage, SubscriptionPlan, UserId, UserSubscription};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, parse_user_id, unique_or_db};

/// Repository over `subscription_plans`, `user_subscriptions`,
/// `quota_usage`, and `task_gauges`.
#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: SqlitePool,
}

impl SubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // --- plans -----------------------------------------------------------

    pub async fn insert_plan(&self, plan: &SubscriptionPlan) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO subscription_plans (name, display_name, description, \
             included_recordings_per_month, included_storage_gb, max_concurrent_tasks, \
             max_automation_jobs, min_automation_interval_hours, is_active, sort_order, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&plan.name)
        .bind(&plan.display_name)
        .bind(&plan.description)
        .bind(plan.included_recordings_per_month)
        .bind(plan.included_storage_gb)
        .bind(plan.max_concurrent_tasks)
        .bind(plan.max_automation_jobs)
        .bind(plan.min_automation_interval_hours)
        .bind(plan.is_active)
        .bind(plan.sort_order)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "subscription plan"))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_plan(&self, id: i64) -> Result<Option<SubscriptionPlan>, FlowError> {
        let row = sqlx::query("SELECT * FROM subscription_plans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_plan(&r)).transpose()
    }

    // --- subscriptions ---------------------------------------------------

    pub async fn upsert_subscription(&self, subscription: &UserSubscription) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO user_subscriptions (user_id, plan_id, custom_max_recordings_per_month, \
             custom_max_storage_gb, custom_max_concurrent_tasks, custom_max_automation_jobs, \
             custom_min_automation_interval_hours, starts_at, expires_at, notes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id) DO UPDATE SET \
               plan_id = excluded.plan_id, \
               custom_max_recordings_per_month = excluded.custom_max_recordings_per_month, \
               custom_max_storage_gb = excluded.custom_max_storage_gb, \
               custom_max_concurrent_tasks = excluded.custom_max_concurrent_tasks, \
               custom_max_automation_jobs = excluded.custom_max_automation_jobs, \
               custom_min_automation_interval_hours = excluded.custom_min_automation_interval_hours, \
               starts_at = excluded.starts_at, \
               expires_at = excluded.expires_at, \
               notes = excluded.notes, \
               updated_at = excluded.updated_at",
        )
        .bind(subscription.user_id.as_string())
        .bind(subscription.plan_id)
        .bind(subscription.custom_max_recordings_per_month)
        .bind(subscription.custom_max_storage_gb)
        .bind(subscription.custom_max_concurrent_tasks)
        .bind(subscription.custom_max_automation_jobs)
        .bind(subscription.custom_min_automation_interval_hours)
        .bind(subscription.starts_at)
        .bind(subscription.expires_at)
        .bind(&subscription.notes)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_subscription(&self, user_id: UserId) -> Result<Option<UserSubscription>, FlowError> {
        let row = sqlx::query("SELECT * FROM user_subscriptions WHERE user_id = ?")
            .bind(user_id.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_subscription(&r)).transpose()
    }

    // --- monthly usage ---------------------------------------------------

    pub async fn find_usage(&self, user_id: UserId, period: Period) -> Result<Option<QuotaUsage>, FlowError> {
        let row = sqlx::query("SELECT * FROM quota_usage WHERE user_id = ? AND period = ?")
            .bind(user_id.as_string())
            .bind(period.as_i32())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_usage(&r)).transpose()
    }

    /// Atomic `+1` on the period's recording counter, creating the row
    /// lazily on first increment.
    pub async fn increment_recordings(
        &self,
        user_id: UserId,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        sqlx::query(
            "INSERT INTO quota_usage (user_id, period, recordings_count, overage_cost_cents, created_at, updated_at) \
             VALUES (?1, ?2, 1, 0, ?3, ?3) \
             ON CONFLICT (user_id, period) DO UPDATE SET \
               recordings_count = quota_usage.recordings_count + 1, updated_at = ?3",
        )
        .bind(user_id.as_string())
        .bind(period.as_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // --- concurrency gauge -----------------------------------------------

    pub async fn gauge(&self, user_id: UserId) -> Result<i64, FlowError> {
        let count: Option<i64> = sqlx::query_scalar("SELECT concurrent_tasks_count FROM task_gauges WHERE user_id = ?")
            .bind(user_id.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.unwrap_or(0))
    }

    /// Atomic relative adjustment, floored at zero.
    pub async fn adjust_gauge(&self, user_id: UserId, delta: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "INSERT INTO task_gauges (user_id, concurrent_tasks_count, updated_at) \
             VALUES (?1, MAX(0, ?2), ?3) \
             ON CONFLICT (user_id) DO UPDATE SET \
               concurrent_tasks_count = MAX(0, task_gauges.concurrent_tasks_count + ?2), updated_at = ?3",
        )
        .bind(user_id.as_string())
        .bind(delta)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Absolute set, floored at zero.
    pub async fn set_gauge(&self, user_id: UserId, count: i64, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query(
            "INSERT INTO task_gauges (user_id, concurrent_tasks_count, updated_at) \
             VALUES (?1, MAX(0, ?2), ?3) \
             ON CONFLICT (user_id) DO UPDATE SET \
               concurrent_tasks_count = MAX(0, ?2), updated_at = ?3",
        )
        .bind(user_id.as_string())
        .bind(count)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_plan(row: &SqliteRow) -> Result<SubscriptionPlan, FlowError> {
    Ok(SubscriptionPlan {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        display_name: row.try_get("display_name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        included_recordings_per_month: row.try_get("included_recordings_per_month").map_err(db_err)?,
        included_storage_gb: row.try_get("included_storage_gb").map_err(db_err)?,
        max_concurrent_tasks: row.try_get("max_concurrent_tasks").map_err(db_err)?,
        max_automation_jobs: row.try_get("max_automation_jobs").map_err(db_err)?,
        min_automation_interval_hours: row.try_get("min_automation_interval_hours").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
        sort_order: row.try_get("sort_order").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_subscription(row: &SqliteRow) -> Result<UserSubscription, FlowError> {
    Ok(UserSubscription {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        plan_id: row.try_get("plan_id").map_err(db_err)?,
        custom_max_recordings_per_month: row.try_get("custom_max_recordings_per_month").map_err(db_err)?,
        custom_max_storage_gb: row.try_get("custom_max_storage_gb").map_err(db_err)?,
        custom_max_concurrent_tasks: row.try_get("custom_max_concurrent_tasks").map_err(db_err)?,
        custom_max_automation_jobs: row.try_get("custom_max_automation_jobs").map_err(db_err)?,
        custom_min_automation_interval_hours: row.try_get("custom_min_automation_interval_hours").map_err(db_err)?,
        starts_at: row.try_get("starts_at").map_err(db_err)?,
        expires_at: row.try_get("expires_at").map_err(db_err)?,
        notes: row.try_get("notes").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_usage(row: &SqliteRow) -> Result<QuotaUsage, FlowError> {
    Ok(QuotaUsage {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        period: Period::from_i32(row.try_get("period").map_err(db_err)?)?,
        recordings_count: row.try_get("recordings_count").map_err(db_err)?,
        overage_cost_cents: row.try_get("overage_cost_cents").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema::memory_pool;
    use crate::infrastructure::repositories::users::UserRepository;
    use chrono::TimeZone;
    use mediaflow_domain::User;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    async fn seeded_user(pool: &SqlitePool) -> UserId {
        let users = UserRepository::new(pool.clone());
        let slug = users.allocate_slug(now()).await.unwrap();
        let user = User::register(UserId::generate(), slug, format!("u{}@x.example", slug), now());
        users.insert(&user).await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn test_increment_creates_row_lazily() {
        let pool = memory_pool().await.unwrap();
        let repo = SubscriptionRepository::new(pool.clone());
        let user = seeded_user(&pool).await;
        let period = Period::from_datetime(now());

        assert!(repo.find_usage(user, period).await.unwrap().is_none());

        repo.increment_recordings(user, period, now()).await.unwrap();
        repo.increment_recordings(user, period, now()).await.unwrap();

        let usage = repo.find_usage(user, period).await.unwrap().unwrap();
        assert_eq!(usage.recordings_count, 2);
    }

    #[tokio::test]
    async fn test_increment_touches_only_its_period() {
        let pool = memory_pool().await.unwrap();
        let repo = SubscriptionRepository::new(pool.clone());
        let user = seeded_user(&pool).await;
        let march = Period::from_i32(202603).unwrap();
        let april = Period::from_i32(202604).unwrap();

        repo.increment_recordings(user, march, now()).await.unwrap();

        assert_eq!(repo.find_usage(user, march).await.unwrap().unwrap().recordings_count, 1);
        assert!(repo.find_usage(user, april).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gauge_floors_at_zero() {
        let pool = memory_pool().await.unwrap();
        let repo = SubscriptionRepository::new(pool.clone());
        let user = seeded_user(&pool).await;

        assert_eq!(repo.gauge(user).await.unwrap(), 0);

        repo.adjust_gauge(user, 2, now()).await.unwrap();
        assert_eq!(repo.gauge(user).await.unwrap(), 2);

        repo.adjust_gauge(user, -5, now()).await.unwrap();
        assert_eq!(repo.gauge(user).await.unwrap(), 0);

        repo.set_gauge(user, -3, now()).await.unwrap();
        assert_eq!(repo.gauge(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscription_upsert_round_trip() {
        let pool = memory_pool().await.unwrap();
        let repo = SubscriptionRepository::new(pool.clone());
        let user = seeded_user(&pool).await;

        let plan_id = repo
            .insert_plan(&SubscriptionPlan {
                id: 0,
                name: "pro".into(),
                display_name: "Pro".into(),
                description: None,
                included_recordings_per_month: Some(100),
                included_storage_gb: Some(50),
                max_concurrent_tasks: Some(4),
                max_automation_jobs: Some(5),
                min_automation_interval_hours: Some(6),
                is_active: true,
                sort_order: 0,
                created_at: now(),
                updated_at: now(),
            })
            .await
            .unwrap();

        let mut subscription = UserSubscription {
            id: 0,
            user_id: user,
            plan_id,
            custom_max_recordings_per_month: None,
            custom_max_storage_gb: Some(200),
            custom_max_concurrent_tasks: None,
            custom_max_automation_jobs: None,
            custom_min_automation_interval_hours: None,
            starts_at: now(),
            expires_at: None,
            notes: None,
            created_at: now(),
            updated_at: now(),
        };
        repo.upsert_subscription(&subscription).await.unwrap();

        let found = repo.find_subscription(user).await.unwrap().unwrap();
        assert_eq!(found.custom_max_storage_gb, Some(200));

        // Upsert replaces in place, still one row per user.
        subscription.custom_max_storage_gb = Some(300);
        repo.upsert_subscription(&subscription).await.unwrap();
        let found = repo.find_subscription(user).await.unwrap().unwrap();
        assert_eq!(found.custom_max_storage_gb, Some(300));
    }
}
