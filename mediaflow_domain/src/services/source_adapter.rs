// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Adapter Port
//!
//! Contract between the core and platform-specific source integrations.
//! Adapters list candidate recordings for discovery and stream media for the
//! download stage; everything protocol-specific (auth, pagination, URL
//! encoding quirks) stays behind this trait.
//!
//! ## Error contract
//!
//! Adapters classify their failures into the domain taxonomy: transient
//! conditions (network, 5xx, timeout) surface as `RetryableIo`, permanent
//! ones (404, invalid media, revoked credential) as `FatalExternal`. The
//! stage executor's retry behavior is driven entirely by that split.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entities::input_source::{InputSource, SourceType};
use crate::error::FlowError;

/// One recording as listed by a source platform, before it exists locally.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecording {
    /// Adapter-scoped identity used for deduplication.
    pub source_key: String,
    pub display_name: String,
    pub start_time: DateTime<Utc>,
    /// Duration in the unit native to the platform; discovery normalizes
    /// minute-reporting sources to seconds.
    pub duration: f64,
    pub size_bytes: Option<i64>,
    /// False while the platform is still assembling the media (e.g. a
    /// meeting that just ended); such candidates park in `PENDING_SOURCE`.
    pub finalized: bool,
    /// Marked by the adapter when the item is known to be unprocessable.
    pub blank: bool,
    /// Raw listing payload, stored verbatim on the source metadata row.
    pub raw: Value,
}

/// Listing filters passed through from sync configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilters {
    /// Case-insensitive substring the display name must contain.
    pub name_contains: Option<String>,
    /// Glob-ish file patterns for filesystem-like sources.
    pub file_patterns: Vec<String>,
}

/// Result of a media fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    /// Total size of the file on disk after the fetch.
    pub bytes_written: u64,
    /// Whether the fetch resumed a partial file instead of starting over.
    pub resumed: bool,
}

/// Platform-specific source integration.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source type this adapter serves.
    fn source_type(&self) -> SourceType;

    /// Lists candidate recordings in the given window.
    async fn list(
        &self,
        source: &InputSource,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        filters: &ListFilters,
    ) -> Result<Vec<CandidateRecording>, FlowError>;

    /// Streams the media behind `source_key` into `dest`, appending from
    /// `resume_from` bytes when the platform supports range requests.
    async fn fetch(
        &self,
        source: &InputSource,
        source_key: &str,
        dest: &Path,
        resume_from: u64,
    ) -> Result<FetchReport, FlowError>;
}
