// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Calendar-month accounting period, encoded as a `YYYYMM` integer.
//!
//! Quota usage rows are keyed by `(user, period)`; the integer encoding keeps
//! the key compact and naturally ordered in the database.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Accounting period for monthly quota counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(i32);

impl Period {
    /// Derives the period containing the given instant (UTC calendar).
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.year() * 100 + at.month() as i32)
    }

    /// Revives a persisted `YYYYMM` value, rejecting impossible months.
    pub fn from_i32(raw: i32) -> Result<Self, FlowError> {
        let month = raw % 100;
        let year = raw / 100;
        if !(1..=12).contains(&month) || !(1970..=9999).contains(&year) {
            return Err(FlowError::validation(format!("invalid period {}", raw)));
        }
        Ok(Self(raw))
    }

    /// Raw `YYYYMM` form for storage.
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0 / 100
    }

    pub fn month(&self) -> u32 {
        (self.0 % 100) as u32
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year(), self.month())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_datetime() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(Period::from_datetime(at).as_i32(), 202603);
    }

    #[test]
    fn test_december_boundary() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(Period::from_datetime(at).as_i32(), 202512);
        let next = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(Period::from_datetime(next).as_i32(), 202601);
    }

    #[test]
    fn test_from_i32_rejects_bad_month() {
        assert!(Period::from_i32(202613).is_err());
        assert!(Period::from_i32(202600).is_err());
        assert!(Period::from_i32(202612).is_ok());
    }

    #[test]
    fn test_display_padding() {
        let at = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(Period::from_datetime(at).to_string(), "202603");
    }
}
