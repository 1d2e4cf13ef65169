// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Automation Schedules
//!
//! Tagged schedule variants for automation jobs, all projecting onto a
//! canonical `(cron expression, IANA timezone)` pair. The canonical form is
//! the classic 5-field cron line; a seconds field is prepended only when the
//! expression is handed to the `cron` crate parser, which expects one.
//!
//! ## Variants
//!
//! - `TimeOfDay` - once a day at a wall-clock time in a timezone
//! - `Hours` - every N hours, anchored at a starting hour (interval
//!   schedules are timezone-free and evaluate in UTC)
//! - `Weekdays` - selected days of week at a wall-clock time
//! - `Cron` - a raw 5-field expression for everything else
//!
//! ## Fire-time computation
//!
//! Fire times are computed in the job's timezone and converted to UTC, so a
//! `TimeOfDay { 9:00, Europe/Moscow }` job drifts correctly across DST
//! boundaries of that zone. Consecutive fire times are the basis for the
//! minimum-interval quota check: the observed gap between the next two fires
//! must not undercut the tenant's `min_automation_interval_hours`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Days of week accepted by the `Weekdays` variant, in cron encoding
/// (0 = Sunday .. 6 = Saturday).
pub const MAX_WEEKDAY: u8 = 6;

/// Schedule specification for an automation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Once a day at a fixed wall-clock time.
    TimeOfDay { hour: u8, minute: u8, timezone: String },
    /// Every `every_n_hours` hours, anchored at `starting_at` (UTC hour).
    Hours {
        every_n_hours: u32,
        #[serde(default)]
        starting_at: u8,
    },
    /// Selected days of week at a fixed wall-clock time.
    Weekdays {
        weekdays: Vec<u8>,
        hour: u8,
        minute: u8,
        timezone: String,
    },
    /// Raw 5-field cron expression.
    Cron { expression: String, timezone: String },
}

impl Schedule {
    /// Validates field ranges, the timezone name, and cron parseability.
    pub fn validate(&self) -> Result<(), FlowError> {
        match self {
            Schedule::TimeOfDay { hour, minute, .. } => {
                check_clock(*hour, *minute)?;
            }
            Schedule::Hours {
                every_n_hours,
                starting_at,
            } => {
                if !(1..=24).contains(every_n_hours) {
                    return Err(FlowError::validation(format!(
                        "every_n_hours must be within 1..=24, got {}",
                        every_n_hours
                    )));
                }
                if *starting_at > 23 {
                    return Err(FlowError::validation(format!(
                        "starting_at must be within 0..=23, got {}",
                        starting_at
                    )));
                }
            }
            Schedule::Weekdays {
                weekdays, hour, minute, ..
            } => {
                check_clock(*hour, *minute)?;
                if weekdays.is_empty() {
                    return Err(FlowError::validation("weekdays cannot be empty"));
                }
                if let Some(bad) = weekdays.iter().find(|d| **d > MAX_WEEKDAY) {
                    return Err(FlowError::validation(format!(
                        "weekday must be within 0..=6 (0 = Sunday), got {}",
                        bad
                    )));
                }
            }
            Schedule::Cron { expression, .. } => {
                if expression.split_whitespace().count() != 5 {
                    return Err(FlowError::validation(format!(
                        "cron expression must have 5 fields: '{}'",
                        expression
                    )));
                }
            }
        }
        self.tz()?;
        self.cron_schedule()?;
        Ok(())
    }

    /// Canonical 5-field cron projection.
    pub fn to_cron(&self) -> String {
        match self {
            Schedule::TimeOfDay { hour, minute, .. } => format!("{} {} * * *", minute, hour),
            Schedule::Hours {
                every_n_hours,
                starting_at,
            } => {
                if *every_n_hours == 24 {
                    format!("0 {} * * *", starting_at)
                } else if *starting_at == 0 {
                    format!("0 */{} * * *", every_n_hours)
                } else {
                    format!("0 {}/{} * * *", starting_at, every_n_hours)
                }
            }
            Schedule::Weekdays {
                weekdays, hour, minute, ..
            } => {
                let mut days: Vec<u8> = weekdays.clone();
                days.sort_unstable();
                days.dedup();
                // Day names, not numbers: numeric day-of-week encodings
                // disagree between cron dialects, names do not.
                let days = days.iter().map(|d| weekday_name(*d)).collect::<Vec<_>>().join(",");
                format!("{} {} * * {}", minute, hour, days)
            }
            Schedule::Cron { expression, .. } => expression.trim().to_string(),
        }
    }

    /// IANA timezone the schedule evaluates in. Interval schedules are
    /// anchored in UTC.
    pub fn timezone(&self) -> &str {
        match self {
            Schedule::TimeOfDay { timezone, .. }
            | Schedule::Weekdays { timezone, .. }
            | Schedule::Cron { timezone, .. } => timezone,
            Schedule::Hours { .. } => "UTC",
        }
    }

    fn tz(&self) -> Result<Tz, FlowError> {
        Tz::from_str(self.timezone())
            .map_err(|_| FlowError::validation(format!("unknown timezone '{}'", self.timezone())))
    }

    fn cron_schedule(&self) -> Result<cron::Schedule, FlowError> {
        // The cron crate wants a seconds field; the canonical form omits it.
        let with_seconds = format!("0 {}", self.to_cron());
        cron::Schedule::from_str(&with_seconds)
            .map_err(|e| FlowError::validation(format!("invalid cron expression '{}': {}", self.to_cron(), e)))
    }

    /// Next fire time strictly after `after`, in UTC.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, FlowError> {
        Ok(self.upcoming(after, 1)?.into_iter().next())
    }

    /// The next `n` fire times strictly after `after`, in UTC.
    pub fn upcoming(&self, after: DateTime<Utc>, n: usize) -> Result<Vec<DateTime<Utc>>, FlowError> {
        let tz = self.tz()?;
        let schedule = self.cron_schedule()?;
        let local = after.with_timezone(&tz);
        Ok(schedule
            .after(&local)
            .take(n)
            .map(|fire| fire.with_timezone(&Utc))
            .collect())
    }

    /// Observed gap between the next two fires, in whole seconds.
    pub fn observed_interval_seconds(&self, after: DateTime<Utc>) -> Result<Option<i64>, FlowError> {
        let fires = self.upcoming(after, 2)?;
        match fires.as_slice() {
            [first, second] => Ok(Some((*second - *first).num_seconds())),
            _ => Ok(None),
        }
    }

    /// Checks the schedule against a minimum-interval quota (in hours).
    pub fn meets_min_interval(&self, min_hours: i64, from: DateTime<Utc>) -> Result<bool, FlowError> {
        match self.observed_interval_seconds(from)? {
            Some(gap) => Ok(gap >= min_hours * 3600),
            // A schedule that never fires twice cannot undercut the interval.
            None => Ok(true),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::TimeOfDay { hour, minute, timezone } => {
                write!(f, "daily at {:02}:{:02} ({})", hour, minute, timezone)
            }
            Schedule::Hours {
                every_n_hours,
                starting_at,
            } => write!(f, "every {}h starting at {:02}:00 UTC", every_n_hours, starting_at),
            Schedule::Weekdays {
                weekdays, hour, minute, ..
            } => write!(f, "weekdays {:?} at {:02}:{:02}", weekdays, hour, minute),
            Schedule::Cron { expression, timezone } => write!(f, "cron '{}' ({})", expression, timezone),
        }
    }
}

/// Cron day name for a 0-based weekday (0 = Sunday).
fn weekday_name(day: u8) -> &'static str {
    match day {
        0 => "SUN",
        1 => "MON",
        2 => "TUE",
        3 => "WED",
        4 => "THU",
        5 => "FRI",
        _ => "SAT",
    }
}

fn check_clock(hour: u8, minute: u8) -> Result<(), FlowError> {
    if hour > 23 {
        return Err(FlowError::validation(format!("hour must be within 0..=23, got {}", hour)));
    }
    if minute > 59 {
        return Err(FlowError::validation(format!(
            "minute must be within 0..=59, got {}",
            minute
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_time_of_day_projection() {
        let s = Schedule::TimeOfDay {
            hour: 9,
            minute: 30,
            timezone: "UTC".into(),
        };
        assert_eq!(s.to_cron(), "30 9 * * *");
        s.validate().unwrap();
    }

    #[test]
    fn test_hours_projection() {
        let every6 = Schedule::Hours {
            every_n_hours: 6,
            starting_at: 0,
        };
        assert_eq!(every6.to_cron(), "0 */6 * * *");

        let anchored = Schedule::Hours {
            every_n_hours: 6,
            starting_at: 2,
        };
        assert_eq!(anchored.to_cron(), "0 2/6 * * *");

        let daily = Schedule::Hours {
            every_n_hours: 24,
            starting_at: 3,
        };
        assert_eq!(daily.to_cron(), "0 3 * * *");
    }

    #[test]
    fn test_weekdays_projection_sorts_and_dedups() {
        let s = Schedule::Weekdays {
            weekdays: vec![5, 1, 1],
            hour: 18,
            minute: 0,
            timezone: "UTC".into(),
        };
        assert_eq!(s.to_cron(), "0 18 * * MON,FRI");
    }

    #[test]
    fn test_validation_rejects_bad_fields() {
        assert!(Schedule::TimeOfDay {
            hour: 24,
            minute: 0,
            timezone: "UTC".into()
        }
        .validate()
        .is_err());
        assert!(Schedule::Hours {
            every_n_hours: 0,
            starting_at: 0
        }
        .validate()
        .is_err());
        assert!(Schedule::Weekdays {
            weekdays: vec![],
            hour: 9,
            minute: 0,
            timezone: "UTC".into()
        }
        .validate()
        .is_err());
        assert!(Schedule::Cron {
            expression: "* * * *".into(),
            timezone: "UTC".into()
        }
        .validate()
        .is_err());
        assert!(Schedule::TimeOfDay {
            hour: 9,
            minute: 0,
            timezone: "Mars/Olympus".into()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_next_fire_in_timezone() {
        // 09:00 Moscow is 06:00 UTC (no DST in that zone since 2014).
        let s = Schedule::TimeOfDay {
            hour: 9,
            minute: 0,
            timezone: "Europe/Moscow".into(),
        };
        let fire = s.next_fire_after(at(2026, 3, 1, 0, 0)).unwrap().unwrap();
        assert_eq!(fire, at(2026, 3, 1, 6, 0));
    }

    #[test]
    fn test_observed_interval_for_hours() {
        let s = Schedule::Hours {
            every_n_hours: 2,
            starting_at: 0,
        };
        let gap = s.observed_interval_seconds(at(2026, 3, 1, 0, 30)).unwrap().unwrap();
        assert_eq!(gap, 2 * 3600);
        assert!(!s.meets_min_interval(6, at(2026, 3, 1, 0, 30)).unwrap());
        assert!(s.meets_min_interval(2, at(2026, 3, 1, 0, 30)).unwrap());
    }

    #[test]
    fn test_serde_tagged_round_trip() {
        let s = Schedule::Weekdays {
            weekdays: vec![1, 3],
            hour: 10,
            minute: 15,
            timezone: "Europe/Berlin".into(),
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"type\":\"weekdays\""));
        let back: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    proptest! {
        // Round-trip law: the cron projection of TimeOfDay fires exactly at
        // the requested wall-clock time, once every 24 hours.
        #[test]
        fn prop_time_of_day_round_trip(hour in 0u8..24, minute in 0u8..60) {
            let s = Schedule::TimeOfDay { hour, minute, timezone: "UTC".into() };
            let fires = s.upcoming(at(2026, 6, 1, 12, 0), 3).unwrap();
            prop_assert_eq!(fires.len(), 3);
            for pair in fires.windows(2) {
                prop_assert_eq!((pair[1] - pair[0]).num_seconds(), 86_400);
            }
            for fire in fires {
                prop_assert_eq!(fire.hour() as u8, hour);
                prop_assert_eq!(fire.minute() as u8, minute);
            }
        }
    }
}
