// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Target Adapter Port
//!
//! Contract between the core and platform-specific upload integrations.
//! The upload stage resolves the recording's presets, builds one
//! [`UploadRequest`] per target, and hands it to the adapter; retries,
//! per-target state, and bookkeeping stay in the core.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::entities::output_preset::TargetPlatform;
use crate::error::FlowError;

/// Everything an adapter needs to deliver one video to one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub video_path: PathBuf,
    /// Subtitle files to attach, when the platform supports captions.
    pub caption_paths: Vec<PathBuf>,
    pub title: String,
    pub description: Option<String>,
    /// Preset metadata (privacy, playlist, tags) opaque to the core.
    pub preset_metadata: Value,
}

/// Remote identity of a delivered video.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub remote_id: String,
    pub url: Option<String>,
    /// Extra platform response data, stored on the target row.
    pub meta: Value,
}

/// Platform-specific upload integration.
#[async_trait]
pub trait TargetAdapter: Send + Sync {
    /// The platform this adapter delivers to.
    fn platform(&self) -> TargetPlatform;

    /// Uploads one video, streaming from disk.
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, FlowError>;
}
