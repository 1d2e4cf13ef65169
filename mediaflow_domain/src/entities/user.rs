// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # User Entity
//!
//! Tenant identity. A user exclusively owns its recordings, sources, presets,
//! templates, and automation jobs; every other aggregate carries the owning
//! user's ID. Users are created by registration and never destroyed, only
//! deactivated.
//!
//! The numeric `user_slug` is allocated from a durable monotonic sequence and
//! never reused: it names the tenant's storage subtree
//! (`users/user_{slug:06}`), so reuse would let a new tenant inherit files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::value_objects::UserId;

/// Platform role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FlowError> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(FlowError::validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Tenant identity with capability flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Monotonic storage slug; see module docs.
    pub user_slug: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub role: Role,
    pub can_transcribe: bool,
    pub can_process_video: bool,
    pub can_upload: bool,
    pub can_create_templates: bool,
    pub can_delete_recordings: bool,
    pub can_manage_credentials: bool,
    /// IANA timezone used as the default for new automation schedules.
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Creates a freshly registered user with default capabilities.
    pub fn register(id: UserId, user_slug: i64, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_slug,
            email: email.into(),
            full_name: None,
            is_active: true,
            is_verified: false,
            role: Role::User,
            can_transcribe: true,
            can_process_video: true,
            can_upload: true,
            can_create_templates: true,
            can_delete_recordings: true,
            can_manage_credentials: true,
            timezone: "UTC".to_string(),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }
}

/// Opaque session refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// A token is usable while unrevoked and unexpired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_register_defaults() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let user = User::register(UserId::generate(), 42, "a@b.example", now);
        assert!(user.is_active);
        assert!(!user.is_verified);
        assert_eq!(user.role, Role::User);
        assert_eq!(user.user_slug, 42);
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::parse(Role::Admin.as_str()).unwrap(), Role::Admin);
        assert!(Role::parse("owner").is_err());
    }

    #[test]
    fn test_refresh_token_validity() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let token = RefreshToken {
            id: 1,
            user_id: UserId::generate(),
            token: "t".into(),
            expires_at: now + chrono::Duration::days(7),
            is_revoked: false,
            created_at: now,
        };
        assert!(token.is_valid(now));
        assert!(!token.is_valid(now + chrono::Duration::days(8)));

        let revoked = RefreshToken { is_revoked: true, ..token };
        assert!(!revoked.is_valid(now));
    }
}
