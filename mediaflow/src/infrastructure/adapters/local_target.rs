// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Directory Target
//!
//! Filesystem-backed target adapter: "uploads" land in an output directory
//! named by the preset metadata. The delivered file name is the sanitized
//! recording title; captions ride along next to it.

use std::path::PathBuf;

use async_trait::async_trait;
use mediaflow_domain::services::{TargetAdapter, UploadReceipt, UploadRequest};
use mediaflow_domain::{FlowError, TargetPlatform};
use serde_json::json;
use tracing::debug;

/// Target adapter over a local output directory.
///
/// Preset metadata shape: `{ "output_dir": "/path/to/published" }`.
pub struct LocalDirTarget;

impl LocalDirTarget {
    fn output_dir(request: &UploadRequest) -> Result<PathBuf, FlowError> {
        request
            .preset_metadata
            .get("output_dir")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .ok_or_else(|| FlowError::validation("preset has no output_dir configured"))
    }

    /// Keeps titles filesystem-safe without inventing a naming scheme.
    fn sanitize(title: &str) -> String {
        let cleaned: String = title
            .chars()
            .map(|c| if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            "untitled".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

#[async_trait]
impl TargetAdapter for LocalDirTarget {
    fn platform(&self) -> TargetPlatform {
        TargetPlatform::Local
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, FlowError> {
        let dir = Self::output_dir(request)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FlowError::retryable(format!("cannot create output dir: {}", e)))?;

        let extension = request
            .video_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let file_name = format!("{}.{}", Self::sanitize(&request.title), extension);
        let dest = dir.join(&file_name);

        tokio::fs::copy(&request.video_path, &dest)
            .await
            .map_err(|e| FlowError::retryable(format!("copy to target failed: {}", e)))?;

        let mut captions = Vec::new();
        for caption in &request.caption_paths {
            if let Some(name) = caption.file_name() {
                let caption_dest = dir.join(name);
                tokio::fs::copy(caption, &caption_dest)
                    .await
                    .map_err(|e| FlowError::retryable(format!("caption copy failed: {}", e)))?;
                captions.push(caption_dest.to_string_lossy().into_owned());
            }
        }

        debug!(dest = %dest.display(), captions = captions.len(), "local upload delivered");
        Ok(UploadReceipt {
            remote_id: file_name,
            url: Some(format!("file://{}", dest.display())),
            meta: json!({ "captions": captions }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_sanitize() {
        assert_eq!(LocalDirTarget::sanitize("Python Lecture 1"), "Python Lecture 1");
        assert_eq!(LocalDirTarget::sanitize("a/b\\c:d"), "a_b_c_d");
        assert_eq!(LocalDirTarget::sanitize("  "), "untitled");
    }

    #[tokio::test]
    async fn test_upload_copies_video_and_captions() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let video = work.path().join("video.mp4");
        std::fs::write(&video, vec![1u8; 256]).unwrap();
        let caption = work.path().join("subtitles.srt");
        std::fs::write(&caption, "1\n00:00:00,000 --> 00:00:01,000\nhi\n").unwrap();

        let request = UploadRequest {
            video_path: video,
            caption_paths: vec![caption],
            title: "Python Lecture 1".into(),
            description: None,
            preset_metadata: json!({ "output_dir": out.path().to_string_lossy() }),
        };

        let receipt = LocalDirTarget.upload(&request).await.unwrap();
        assert_eq!(receipt.remote_id, "Python Lecture 1.mp4");
        assert!(out.path().join("Python Lecture 1.mp4").exists());
        assert!(out.path().join("subtitles.srt").exists());
        assert!(receipt.url.unwrap().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_missing_output_dir_is_validation_error() {
        let request = UploadRequest {
            video_path: PathBuf::from("/nonexistent.mp4"),
            caption_paths: vec![],
            title: "t".into(),
            description: None,
            preset_metadata: Value::Null,
        };
        let err = LocalDirTarget.upload(&request).await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }
}
