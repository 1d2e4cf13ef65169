// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Download Stage
//!
//! Streams the original media from the source adapter into
//! `recordings/{id}/source.mp4`, with resume support: a partial file on disk
//! continues from its current size, and a file that already passes
//! validation short-circuits to success without touching the network.
//!
//! Validation (size floor, HTML sniff, MP4 magic, expected-size tolerance)
//! mirrors what real platforms get wrong most often - auth walls serving
//! HTML with a 200, and truncated range responses.

use std::path::Path;

use async_trait::async_trait;
use mediaflow_domain::{FlowError, StageType};
use serde_json::json;
use tracing::{info, warn};

use super::{ActionContext, StageAction, StageOutcome};

/// Smallest plausible media file.
const MIN_MEDIA_BYTES: u64 = 1024;
/// A file may exceed the expected size by this factor before we warn.
const SIZE_TOLERANCE: f64 = 1.1;

/// Download action over the registered source adapters.
pub struct DownloadAction;

#[async_trait]
impl StageAction for DownloadAction {
    fn stage_type(&self) -> StageType {
        StageType::Download
    }

    async fn run(&self, ctx: &ActionContext) -> StageOutcome {
        let recording = &ctx.recording;

        let Some(source_id) = recording.input_source_id else {
            return StageOutcome::Fatal("recording has no input source".into());
        };
        let source = match ctx.app.sources.find_owned(recording.user_id, source_id).await {
            Ok(Some(source)) => source,
            Ok(None) => return StageOutcome::Fatal(format!("input source {} not found", source_id)),
            Err(e) => return StageOutcome::Retryable(e.to_string()),
        };
        let meta = match ctx.app.source_meta.find_by_recording(recording.id).await {
            Ok(Some(meta)) => meta,
            Ok(None) => return StageOutcome::Fatal("recording has no source metadata".into()),
            Err(e) => return StageOutcome::Retryable(e.to_string()),
        };
        let Some(adapter) = ctx.app.source_adapter(source.source_type) else {
            return StageOutcome::Fatal(format!("no source adapter registered for {}", source.source_type));
        };

        let dest = ctx.app.paths.recording_source(ctx.user_slug(), recording.id);
        let expected_size = meta.metadata.get("size_bytes").and_then(|v| v.as_i64()).map(|v| v as u64);

        // Resume bookkeeping: a valid file is done, an invalid one restarts,
        // a partial one continues from its tail.
        let mut resume_from = 0;
        if let Ok(existing) = std::fs::metadata(&dest) {
            match validate_media_file(&dest, expected_size) {
                Ok(size) => {
                    info!(recording = recording.id, size, "download already on disk and valid, skipping fetch");
                    return self.record_success(ctx, &dest, size, true).await;
                }
                // Resume only an honest partial: a known expected size the
                // file has not reached yet. Anything else restarts clean.
                Err(_) if expected_size.is_some_and(|expected| existing.len() < expected) => {
                    resume_from = existing.len();
                    info!(recording = recording.id, resume_from, "resuming partial download");
                }
                Err(reason) => {
                    warn!(recording = recording.id, %reason, "existing file invalid, restarting download");
                    if let Err(e) = std::fs::remove_file(&dest) {
                        return StageOutcome::Retryable(format!("cannot remove invalid file: {}", e));
                    }
                }
            }
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return StageOutcome::Retryable(format!("cannot create recording directory: {}", e));
            }
        }

        let report = match adapter.fetch(&source, &meta.source_key, &dest, resume_from).await {
            Ok(report) => report,
            Err(e) => return classify(e),
        };

        match validate_media_file(&dest, expected_size) {
            Ok(size) => self.record_success(ctx, &dest, size, report.resumed).await,
            Err(reason) => {
                warn!(recording = recording.id, %reason, "downloaded file failed validation");
                StageOutcome::Retryable(format!("download validation failed: {}", reason))
            }
        }
    }
}

impl DownloadAction {
    async fn record_success(&self, ctx: &ActionContext, dest: &Path, size: u64, resumed: bool) -> StageOutcome {
        let now = ctx.app.clock.now();
        if let Err(e) = ctx
            .app
            .recordings
            .set_download_result(ctx.recording.id, &dest.to_string_lossy(), size as i64, now)
            .await
        {
            return StageOutcome::Retryable(e.to_string());
        }
        StageOutcome::Ok(json!({ "bytes": size, "resumed": resumed }))
    }
}

fn classify(e: FlowError) -> StageOutcome {
    if e.is_retryable() {
        StageOutcome::Retryable(e.to_string())
    } else {
        StageOutcome::Fatal(e.to_string())
    }
}

/// Validates a downloaded file by size and content sniffing.
///
/// Returns the file size on success, a reason on failure.
pub fn validate_media_file(path: &Path, expected_size: Option<u64>) -> Result<u64, String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("stat failed: {}", e))?;
    let size = meta.len();

    if size < MIN_MEDIA_BYTES {
        return Err(format!("file too small ({} bytes)", size));
    }

    if let Some(expected) = expected_size {
        if size < expected {
            return Err(format!("incomplete: {}/{} bytes", size, expected));
        }
        if size as f64 > expected as f64 * SIZE_TOLERANCE {
            warn!(path = %path.display(), size, expected, "file exceeds expected size by >10%");
        }
    }

    let head = read_head(path, 1024).map_err(|e| format!("read failed: {}", e))?;
    let lowered = head.to_ascii_lowercase();
    if lowered.windows(5).any(|w| w == b"<html") || lowered.windows(14).any(|w| w == b"<!doctype html") {
        return Err("server returned an HTML page instead of media".into());
    }

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp4")) {
        let looks_like_mp4 = head.starts_with(b"\x00\x00\x00")
            || head.windows(4).any(|w| w == b"ftyp")
            || head.windows(4).any(|w| w == b"moov");
        if !looks_like_mp4 {
            return Err("not a valid MP4 container".into());
        }
    }

    Ok(size)
}

fn read_head(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; limit];
    let n = file.read(&mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_mp4(dir: &Path, name: &str, payload_len: usize) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 32]);
        data.extend_from_slice(b"ftypisom");
        data.resize(payload_len, 0xAB);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_valid_mp4_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mp4(dir.path(), "a.mp4", 4096);
        assert_eq!(validate_media_file(&path, Some(4096)).unwrap(), 4096);
    }

    #[test]
    fn test_tiny_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"ftyp").unwrap();
        assert!(validate_media_file(&path, None).unwrap_err().contains("too small"));
    }

    #[test]
    fn test_html_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        let mut body = b"<!DOCTYPE html><html><body>login required</body></html>".to_vec();
        body.resize(4096, b' ');
        std::fs::write(&path, body).unwrap();
        assert!(validate_media_file(&path, None).unwrap_err().contains("HTML"));
    }

    #[test]
    fn test_incomplete_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mp4(dir.path(), "a.mp4", 2048);
        let err = validate_media_file(&path, Some(10_000)).unwrap_err();
        assert!(err.contains("incomplete"));
    }

    #[test]
    fn test_garbage_mp4_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, vec![0xFFu8; 4096]).unwrap();
        assert!(validate_media_file(&path, None).unwrap_err().contains("MP4"));
    }

    #[test]
    fn test_non_mp4_extension_skips_container_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, vec![0xFFu8; 4096]).unwrap();
        assert!(validate_media_file(&path, None).is_ok());
    }
}
