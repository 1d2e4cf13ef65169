// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Media Processor Port
//!
//! Video transformations (silence-aware trimming, audio extraction) are
//! external collaborators wrapping an encoder toolchain. The core passes
//! validated settings and file paths; the processor reports what it did.

use std::path::Path;

use async_trait::async_trait;

use crate::error::FlowError;
use crate::value_objects::TrimmingSettings;

/// What the trim pass actually cut.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimReport {
    /// Seconds removed from the head of the video.
    pub trimmed_head_seconds: f64,
    /// Seconds removed from the tail of the video.
    pub trimmed_tail_seconds: f64,
    pub final_duration_seconds: f64,
}

/// Result of extracting the audio track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioReport {
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

/// Video transformation capability.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Trims `input` into `output` according to the settings (audio
    /// detection, intro/outro removal).
    async fn trim(&self, input: &Path, output: &Path, settings: &TrimmingSettings) -> Result<TrimReport, FlowError>;

    /// Extracts the audio track as 64k 16 kHz mono MP3.
    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<AudioReport, FlowError>;
}
