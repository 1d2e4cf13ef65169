// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transcription Stage
//!
//! Hands the extracted audio to the transcriber and persists the structured
//! result: `transcriptions/master.json` plus the plain-text cache files
//! (`cache/segments.txt`, `cache/words.txt`). Downstream stages (topics,
//! subtitles) read `master.json`; the cache files exist for humans and
//! export tooling.

use std::path::PathBuf;

use async_trait::async_trait;
use mediaflow_domain::services::TranscribeRequest;
use mediaflow_domain::StageType;
use serde_json::json;
use tracing::info;

use super::{ActionContext, StageAction, StageOutcome};

/// Transcription action over the registered transcriber.
pub struct TranscribeAction;

#[async_trait]
impl StageAction for TranscribeAction {
    fn stage_type(&self) -> StageType {
        StageType::Transcribe
    }

    async fn run(&self, ctx: &ActionContext) -> StageOutcome {
        let recording = &ctx.recording;

        let Some(transcriber) = ctx.app.transcriber() else {
            return StageOutcome::Fatal("transcriber not configured".into());
        };
        let Some(settings) = ctx.config.transcription.clone() else {
            return StageOutcome::Skipped("transcription not configured".into());
        };

        // Prefer the extracted audio track; fall back to whatever media we
        // have when the trim stage didn't run.
        let media = recording
            .processed_audio_path
            .as_ref()
            .or(recording.processed_video_path.as_ref())
            .or(recording.local_video_path.as_ref());
        let Some(media) = media else {
            return StageOutcome::Fatal("no media on disk to transcribe".into());
        };
        let media = PathBuf::from(media);
        if !media.exists() {
            return StageOutcome::Fatal(format!("media missing on disk: {}", media.display()));
        }

        let request = TranscribeRequest {
            audio_path: media,
            language: settings.language.clone(),
            prompt: settings.prompt.clone(),
            vocabulary: settings.vocabulary.clone().unwrap_or_default(),
        };

        let transcript = match transcriber.transcribe(&request).await {
            Ok(transcript) => transcript,
            Err(e) if e.is_retryable() => return StageOutcome::Retryable(e.to_string()),
            Err(e) => return StageOutcome::Fatal(e.to_string()),
        };

        let dir = ctx.app.paths.transcription_dir(ctx.user_slug(), recording.id);
        let cache = ctx.app.paths.transcription_cache_dir(ctx.user_slug(), recording.id);
        if let Err(e) = std::fs::create_dir_all(&cache) {
            return StageOutcome::Retryable(format!("cannot create transcription dirs: {}", e));
        }

        let master = ctx.app.paths.transcription_master(ctx.user_slug(), recording.id);
        let master_json = match serde_json::to_string_pretty(&transcript) {
            Ok(json) => json,
            Err(e) => return StageOutcome::Fatal(format!("cannot serialize transcript: {}", e)),
        };
        if let Err(e) = std::fs::write(&master, master_json) {
            return StageOutcome::Retryable(format!("cannot write master.json: {}", e));
        }
        if let Err(e) = std::fs::write(cache.join("segments.txt"), transcript.segment_lines()) {
            return StageOutcome::Retryable(format!("cannot write segments cache: {}", e));
        }
        if let Err(e) = std::fs::write(cache.join("words.txt"), transcript.word_lines()) {
            return StageOutcome::Retryable(format!("cannot write words cache: {}", e));
        }

        let now = ctx.app.clock.now();
        if let Err(e) = ctx
            .app
            .recordings
            .set_transcription_dir(recording.id, &dir.to_string_lossy(), now)
            .await
        {
            return StageOutcome::Retryable(e.to_string());
        }

        info!(
            recording = recording.id,
            segments = transcript.segments.len(),
            language = transcript.language.as_deref().unwrap_or("unknown"),
            "transcription finished"
        );

        StageOutcome::Ok(json!({
            "language": transcript.language,
            "duration_seconds": transcript.duration_seconds,
            "segments": transcript.segments.len(),
            "words": transcript.words.len(),
        }))
    }
}
