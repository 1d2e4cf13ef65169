// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Stage
//!
//! Delivers the processed video to every configured target. Each target
//! carries its own retry budget (5 attempts, exponential backoff capped at
//! five minutes) and fails independently: a dead destination leaves the
//! recording in `PROCESSED` with one `FAILED` target row, never in
//! `FAILED`.
//!
//! An already-`UPLOADED` target is never re-sent, so re-running the stage
//! after a partial outage only touches the targets that still need it.

use std::path::PathBuf;

use async_trait::async_trait;
use mediaflow_domain::services::UploadRequest;
use mediaflow_domain::{StageType, TargetStatus};
use serde_json::json;
use tracing::{info, warn};

use super::{upload_backoff, ActionContext, StageAction, StageOutcome};

/// Attempts per target.
const MAX_TARGET_ATTEMPTS: u32 = 5;

/// Upload action over the registered target adapters.
pub struct UploadAction;

#[async_trait]
impl StageAction for UploadAction {
    fn stage_type(&self) -> StageType {
        StageType::Upload
    }

    async fn run(&self, ctx: &ActionContext) -> StageOutcome {
        let recording = &ctx.recording;

        let Some(output) = ctx.config.output_config.clone() else {
            return StageOutcome::Skipped("no output configuration".into());
        };

        let video = recording
            .processed_video_path
            .as_ref()
            .or(recording.local_video_path.as_ref());
        let Some(video) = video else {
            return StageOutcome::Fatal("no processed video to upload".into());
        };
        let video = PathBuf::from(video);
        if !video.exists() {
            return StageOutcome::Fatal(format!("video missing on disk: {}", video.display()));
        }

        let presets = match ctx.app.presets.list_by_ids(recording.user_id, &output.preset_ids).await {
            Ok(presets) => presets,
            Err(e) => return StageOutcome::Retryable(e.to_string()),
        };
        if presets.is_empty() {
            return StageOutcome::Skipped("no resolvable output presets".into());
        }

        let caption_paths = if output.upload_captions {
            collect_captions(ctx)
        } else {
            Vec::new()
        };

        let mut uploaded = 0usize;
        let mut failed = 0usize;

        for preset in &presets {
            let target = match ctx
                .app
                .targets
                .ensure(recording.id, recording.user_id, preset.id, preset.platform, ctx.app.clock.now())
                .await
            {
                Ok(target) => target,
                Err(e) => return StageOutcome::Retryable(e.to_string()),
            };
            if target.status == TargetStatus::Uploaded {
                uploaded += 1;
                continue;
            }

            let Some(adapter) = ctx.app.target_adapter(preset.platform) else {
                warn!(recording = recording.id, platform = %preset.platform, "no target adapter registered");
                let _ = ctx
                    .app
                    .targets
                    .mark_failed(target.id, "no adapter registered for platform", ctx.app.clock.now())
                    .await;
                failed += 1;
                continue;
            };

            let request = UploadRequest {
                video_path: video.clone(),
                caption_paths: caption_paths.clone(),
                title: recording.display_name.clone(),
                description: None,
                preset_metadata: preset.preset_metadata.clone(),
            };

            if let Err(e) = ctx.app.targets.begin_upload(target.id, ctx.app.clock.now()).await {
                return StageOutcome::Retryable(e.to_string());
            }

            let mut delivered = false;
            for attempt in 1..=MAX_TARGET_ATTEMPTS {
                if ctx.cancel.is_cancelled() {
                    let _ = ctx
                        .app
                        .targets
                        .mark_failed(target.id, "cancelled during upload", ctx.app.clock.now())
                        .await;
                    return StageOutcome::Retryable("cancelled".into());
                }
                if attempt > 1 {
                    tokio::time::sleep(upload_backoff(attempt - 1)).await;
                    if let Err(e) = ctx.app.targets.count_attempt(target.id, ctx.app.clock.now()).await {
                        return StageOutcome::Retryable(e.to_string());
                    }
                }

                match adapter.upload(&request).await {
                    Ok(receipt) => {
                        let meta = json!({
                            "remote_id": receipt.remote_id,
                            "url": receipt.url,
                            "platform": preset.platform.as_str(),
                            "extra": receipt.meta,
                        });
                        if let Err(e) = ctx.app.targets.mark_uploaded(target.id, &meta, ctx.app.clock.now()).await {
                            return StageOutcome::Retryable(e.to_string());
                        }
                        info!(recording = recording.id, platform = %preset.platform, "upload delivered");
                        delivered = true;
                        break;
                    }
                    Err(e) if e.is_retryable() && attempt < MAX_TARGET_ATTEMPTS => {
                        warn!(
                            recording = recording.id,
                            platform = %preset.platform,
                            attempt,
                            error = %e,
                            "upload attempt failed, retrying"
                        );
                    }
                    Err(e) => {
                        let _ = ctx.app.targets.mark_failed(target.id, &e.to_string(), ctx.app.clock.now()).await;
                        break;
                    }
                }
            }

            if delivered {
                uploaded += 1;
            } else {
                failed += 1;
            }
        }

        let meta = json!({ "uploaded": uploaded, "failed": failed, "targets": presets.len() });
        if failed == 0 {
            StageOutcome::Ok(meta)
        } else {
            // The recording stays PROCESSED; the failed target rows carry
            // the detail.
            StageOutcome::Fatal(format!("{} of {} targets failed", failed, presets.len()))
        }
    }
}

fn collect_captions(ctx: &ActionContext) -> Vec<PathBuf> {
    let cache = ctx.app.paths.transcription_cache_dir(ctx.user_slug(), ctx.recording.id);
    let Ok(entries) = std::fs::read_dir(&cache) else {
        return Vec::new();
    };
    let mut captions: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("srt") || ext.eq_ignore_ascii_case("vtt"))
        })
        .collect();
    captions.sort();
    captions
}
