// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Repositories
//!
//! Column-mapped repositories over one shared `SqlitePool`, one module per
//! aggregate. All queries are parameterized; JSON blobs travel as TEXT and
//! are decoded at the edge; timestamps are RFC 3339 TEXT handled by the
//! sqlx chrono integration.
//!
//! Uniqueness violations are translated to [`FlowError::Conflict`] so the
//! service layer can surface duplicate names and duplicate source keys
//! without inspecting driver errors.

pub mod jobs;
pub mod presets;
pub mod recordings;
pub mod schema;
pub mod sources;
pub mod stages;
pub mod subscriptions;
pub mod targets;
pub mod templates;
pub mod users;

pub use jobs::AutomationJobRepository;
pub use presets::OutputPresetRepository;
pub use recordings::RecordingRepository;
pub use sources::{InputSourceRepository, SourceKeyMatch, SourceMetadataRepository};
pub use stages::{StageRepository, StageTimingRepository};
pub use subscriptions::SubscriptionRepository;
pub use targets::OutputTargetRepository;
pub use templates::TemplateRepository;
pub use users::UserRepository;

use mediaflow_domain::{FlowError, UserId};
use serde_json::Value;

/// Maps a driver error onto the domain taxonomy.
pub(crate) fn db_err(e: sqlx::Error) -> FlowError {
    FlowError::Database(e.to_string())
}

/// Like [`db_err`], but surfaces unique-constraint violations as conflicts.
pub(crate) fn unique_or_db(e: sqlx::Error, what: &str) -> FlowError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return FlowError::conflict(format!("{} already exists", what));
        }
    }
    db_err(e)
}

/// JSON value → nullable TEXT column.
pub(crate) fn json_text(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Nullable TEXT column → JSON value (`NULL` becomes `Value::Null`).
pub(crate) fn parse_json_text(text: Option<String>) -> Result<Value, FlowError> {
    match text {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| FlowError::Serialization(format!("bad JSON column: {}", e))),
        None => Ok(Value::Null),
    }
}

/// TEXT column → validated user id.
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, FlowError> {
    UserId::parse(raw).map_err(|_| FlowError::invariant(format!("malformed user id in row: '{}'", raw)))
}
