// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Subtitle Rendering Stage
//!
//! Optional stage: renders the transcript into the configured subtitle
//! formats under `transcriptions/cache/`. Pure local work - no external
//! collaborator - so the only retryable failures are filesystem ones.

use async_trait::async_trait;
use mediaflow_domain::services::Transcript;
use mediaflow_domain::value_objects::processing_config::validate_subtitle_formats;
use mediaflow_domain::StageType;
use serde_json::json;

use super::{ActionContext, StageAction, StageOutcome};

/// Subtitle render action.
pub struct SubtitlesAction;

#[async_trait]
impl StageAction for SubtitlesAction {
    fn stage_type(&self) -> StageType {
        StageType::GenerateSubtitles
    }

    async fn run(&self, ctx: &ActionContext) -> StageOutcome {
        let recording = &ctx.recording;

        let formats = ctx
            .config
            .transcription
            .as_ref()
            .map(|t| t.subtitle_formats.clone())
            .unwrap_or_default();
        if formats.is_empty() {
            return StageOutcome::Skipped("no subtitle formats configured".into());
        }
        if let Err(e) = validate_subtitle_formats(&formats) {
            return StageOutcome::Fatal(e.to_string());
        }

        let master = ctx.app.paths.transcription_master(ctx.user_slug(), recording.id);
        let raw = match std::fs::read_to_string(&master) {
            Ok(raw) => raw,
            Err(e) => return StageOutcome::Skipped(format!("no transcript to render: {}", e)),
        };
        let transcript: Transcript = match serde_json::from_str(&raw) {
            Ok(transcript) => transcript,
            Err(e) => return StageOutcome::Fatal(format!("corrupt master.json: {}", e)),
        };

        let cache = ctx.app.paths.transcription_cache_dir(ctx.user_slug(), recording.id);
        if let Err(e) = std::fs::create_dir_all(&cache) {
            return StageOutcome::Retryable(format!("cannot create cache dir: {}", e));
        }

        let mut written = Vec::new();
        for format in &formats {
            let (name, body) = match format.as_str() {
                "srt" => ("subtitles.srt", transcript.render_srt()),
                "vtt" => ("subtitles.vtt", transcript.render_vtt()),
                "txt" => ("subtitles.txt", transcript.plain_text()),
                other => return StageOutcome::Fatal(format!("unsupported subtitle format '{}'", other)),
            };
            if let Err(e) = std::fs::write(cache.join(name), body) {
                return StageOutcome::Retryable(format!("cannot write {}: {}", name, e));
            }
            written.push(format.clone());
        }

        StageOutcome::Ok(json!({ "formats": written }))
    }
}
