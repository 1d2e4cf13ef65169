// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Adapter-specific identity of a discovered recording, used for
//! deduplication: `(source_type, source_key)` is unique per user across
//! non-hard-deleted recordings. The raw listing payload rides along for
//! debugging and re-sync.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::input_source::SourceType;
use crate::value_objects::UserId;

/// Source identity row; unique per recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub id: i64,
    pub recording_id: i64,
    pub user_id: UserId,
    pub input_source_id: Option<i64>,
    pub source_type: SourceType,
    /// Adapter-scoped identity of the media item (meeting UUID, file path,
    /// video URL hash).
    pub source_key: String,
    pub metadata: Value,
}
