// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Quota Limits
//!
//! Value objects for per-tenant limits. Every limit field is either a
//! concrete integer or unlimited; unlimited is represented by absence in
//! storage (`NULL`) and by [`QuotaLimit::Unlimited`] in code, never by a
//! sentinel number.
//!
//! The resolution order for an effective limit is:
//!
//! 1. per-user `custom_*` override on the subscription
//! 2. the subscription plan's default
//! 3. the built-in platform default
//!
//! All quota arithmetic is integer; storage limits are whole gigabytes.

use serde::{Deserialize, Serialize};

/// A single quota limit: a concrete ceiling or unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaLimit {
    Limited(i64),
    Unlimited,
}

impl QuotaLimit {
    /// Maps a nullable storage column onto a limit.
    pub fn from_option(value: Option<i64>) -> Self {
        match value {
            Some(v) => Self::Limited(v),
            None => Self::Unlimited,
        }
    }

    /// Nullable storage form.
    pub fn as_option(&self) -> Option<i64> {
        match self {
            Self::Limited(v) => Some(*v),
            Self::Unlimited => None,
        }
    }

    /// Whether `used` has reached this limit. Unlimited never saturates.
    pub fn is_exhausted_by(&self, used: i64) -> bool {
        match self {
            Self::Limited(max) => used >= *max,
            Self::Unlimited => false,
        }
    }

    /// Remaining headroom, if the limit is concrete.
    pub fn available(&self, used: i64) -> Option<i64> {
        match self {
            Self::Limited(max) => Some((max - used).max(0)),
            Self::Unlimited => None,
        }
    }
}

/// Resolved per-tenant limits after applying overrides over plan defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveQuotas {
    pub max_recordings_per_month: QuotaLimit,
    pub max_storage_gb: QuotaLimit,
    pub max_concurrent_tasks: QuotaLimit,
    pub max_automation_jobs: QuotaLimit,
    pub min_automation_interval_hours: QuotaLimit,
}

impl EffectiveQuotas {
    /// Built-in platform defaults, used when a tenant has no subscription row.
    pub fn builtin_defaults() -> Self {
        Self {
            max_recordings_per_month: QuotaLimit::Limited(10),
            max_storage_gb: QuotaLimit::Limited(5),
            max_concurrent_tasks: QuotaLimit::Limited(2),
            max_automation_jobs: QuotaLimit::Limited(1),
            min_automation_interval_hours: QuotaLimit::Limited(6),
        }
    }

    /// Fully open quotas, for admin tooling and tests.
    pub fn unlimited() -> Self {
        Self {
            max_recordings_per_month: QuotaLimit::Unlimited,
            max_storage_gb: QuotaLimit::Unlimited,
            max_concurrent_tasks: QuotaLimit::Unlimited,
            max_automation_jobs: QuotaLimit::Unlimited,
            min_automation_interval_hours: QuotaLimit::Unlimited,
        }
    }
}

/// Result of a quota admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Ok,
    Denied(String),
}

impl Admission {
    pub fn is_ok(&self) -> bool {
        matches!(self, Admission::Ok)
    }

    /// Denial reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Admission::Ok => None,
            Admission::Denied(reason) => Some(reason),
        }
    }
}

/// Point-in-time usage report for one resource, as shown to the tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub used: i64,
    pub limit: Option<i64>,
    pub available: Option<i64>,
}

impl ResourceUsage {
    pub fn new(used: i64, limit: QuotaLimit) -> Self {
        Self {
            used,
            limit: limit.as_option(),
            available: limit.available(used),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_never_exhausts() {
        assert!(!QuotaLimit::Unlimited.is_exhausted_by(i64::MAX));
    }

    #[test]
    fn test_limited_exhaustion_boundary() {
        let limit = QuotaLimit::Limited(100);
        assert!(!limit.is_exhausted_by(99));
        assert!(limit.is_exhausted_by(100));
        assert!(limit.is_exhausted_by(101));
    }

    #[test]
    fn test_available_floors_at_zero() {
        assert_eq!(QuotaLimit::Limited(5).available(9), Some(0));
        assert_eq!(QuotaLimit::Limited(5).available(2), Some(3));
        assert_eq!(QuotaLimit::Unlimited.available(2), None);
    }

    #[test]
    fn test_resource_usage_report() {
        let usage = ResourceUsage::new(3, QuotaLimit::Limited(10));
        assert_eq!(usage.limit, Some(10));
        assert_eq!(usage.available, Some(7));
    }
}
