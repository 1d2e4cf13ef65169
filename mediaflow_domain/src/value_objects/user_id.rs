// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # User Identifier
//!
//! ULID-backed tenant identifier. ULIDs give the platform sortable,
//! collision-free 26-character identifiers that remain stable across the
//! lifetime of a tenant; the storage layer treats them as opaque strings.
//!
//! ## Key Features
//!
//! - **Type Safety**: a `UserId` cannot be confused with other string keys
//! - **Validation**: parsing rejects anything that is not a canonical ULID
//! - **Serialization**: serde round-trips through the 26-char string form
//! - **Ordering**: lexicographic order equals creation order (ULID property)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::FlowError;

/// Unique identifier for a tenant (user).
///
/// Wraps a ULID and serializes as its canonical 26-character string. New
/// identifiers are minted through [`UserId::generate`]; persisted values are
/// revived with [`UserId::parse`], which validates the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Ulid);

impl UserId {
    /// Length of the canonical string form.
    pub const ENCODED_LEN: usize = 26;

    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parses a persisted identifier, validating the ULID encoding.
    pub fn parse(s: &str) -> Result<Self, FlowError> {
        if s.len() != Self::ENCODED_LEN {
            return Err(FlowError::validation(format!(
                "user id must be {} characters, got {}",
                Self::ENCODED_LEN,
                s.len()
            )));
        }
        Ulid::from_str(s)
            .map(Self)
            .map_err(|e| FlowError::validation(format!("invalid user id '{}': {}", s, e)))
    }

    /// Returns the canonical 26-character string form.
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }

    /// Timestamp component of the underlying ULID, useful for audit views.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
