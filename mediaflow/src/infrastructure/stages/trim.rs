// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Trim Stage
//!
//! Runs the media processor over the downloaded source: silence-aware
//! trimming into `video.mp4`, then audio extraction into `audio.mp3`
//! (64k, 16 kHz mono). Both path pointers land on the recording so the
//! transcription stage finds its input regardless of what was trimmed.

use std::path::PathBuf;

use async_trait::async_trait;
use mediaflow_domain::StageType;
use serde_json::json;
use tracing::info;

use super::{ActionContext, StageAction, StageOutcome};

/// Trim + audio-extract action over the registered media processor.
pub struct TrimAction;

#[async_trait]
impl StageAction for TrimAction {
    fn stage_type(&self) -> StageType {
        StageType::Trim
    }

    async fn run(&self, ctx: &ActionContext) -> StageOutcome {
        let recording = &ctx.recording;

        let Some(processor) = ctx.app.media_processor() else {
            return StageOutcome::Fatal("media processor not configured".into());
        };
        let Some(settings) = ctx.config.trimming.clone() else {
            return StageOutcome::Skipped("trimming not configured".into());
        };

        let input = match &recording.local_video_path {
            Some(path) => PathBuf::from(path),
            None => return StageOutcome::Fatal("recording has no downloaded video".into()),
        };
        if !input.exists() {
            return StageOutcome::Fatal(format!("downloaded video missing on disk: {}", input.display()));
        }

        let video_out = ctx.app.paths.recording_video(ctx.user_slug(), recording.id);
        let audio_out = ctx.app.paths.recording_audio(ctx.user_slug(), recording.id);

        let trim_report = match processor.trim(&input, &video_out, &settings).await {
            Ok(report) => report,
            Err(e) if e.is_retryable() => return StageOutcome::Retryable(e.to_string()),
            Err(e) => return StageOutcome::Fatal(e.to_string()),
        };
        info!(
            recording = recording.id,
            head = trim_report.trimmed_head_seconds,
            tail = trim_report.trimmed_tail_seconds,
            "trim finished"
        );

        let audio_report = match processor.extract_audio(&video_out, &audio_out).await {
            Ok(report) => report,
            Err(e) if e.is_retryable() => return StageOutcome::Retryable(e.to_string()),
            Err(e) => return StageOutcome::Fatal(e.to_string()),
        };

        let now = ctx.app.clock.now();
        if let Err(e) = ctx
            .app
            .recordings
            .set_processed_paths(
                recording.id,
                Some(&video_out.to_string_lossy()),
                Some(&audio_out.to_string_lossy()),
                now,
            )
            .await
        {
            return StageOutcome::Retryable(e.to_string());
        }

        StageOutcome::Ok(json!({
            "trimmed_head_seconds": trim_report.trimmed_head_seconds,
            "trimmed_tail_seconds": trim_report.trimmed_tail_seconds,
            "final_duration_seconds": trim_report.final_duration_seconds,
            "audio_duration_seconds": audio_report.duration_seconds,
            "audio_size_bytes": audio_report.size_bytes,
        }))
    }
}
