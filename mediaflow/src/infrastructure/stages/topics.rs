// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Topic Extraction Stage
//!
//! Optional stage: feeds the finished transcript to the topic extractor and
//! writes `topics.json` plus the combined `extracted.json` export. Failures
//! here never block the pipeline.

use async_trait::async_trait;
use mediaflow_domain::services::Transcript;
use mediaflow_domain::StageType;
use serde_json::json;

use super::{ActionContext, StageAction, StageOutcome};

/// Topic extraction over the registered extractor.
pub struct TopicsAction;

#[async_trait]
impl StageAction for TopicsAction {
    fn stage_type(&self) -> StageType {
        StageType::ExtractTopics
    }

    async fn run(&self, ctx: &ActionContext) -> StageOutcome {
        let recording = &ctx.recording;

        let Some(extractor) = ctx.app.topic_extractor() else {
            return StageOutcome::Skipped("topic extractor not configured".into());
        };
        let granularity = ctx
            .config
            .transcription
            .as_ref()
            .map(|t| t.granularity)
            .unwrap_or_default();

        let master = ctx.app.paths.transcription_master(ctx.user_slug(), recording.id);
        let raw = match std::fs::read_to_string(&master) {
            Ok(raw) => raw,
            Err(e) => return StageOutcome::Skipped(format!("no transcript to extract from: {}", e)),
        };
        let transcript: Transcript = match serde_json::from_str(&raw) {
            Ok(transcript) => transcript,
            Err(e) => return StageOutcome::Fatal(format!("corrupt master.json: {}", e)),
        };

        let outline = match extractor.extract(&transcript, granularity).await {
            Ok(outline) => outline,
            Err(e) if e.is_retryable() => return StageOutcome::Retryable(e.to_string()),
            Err(e) => return StageOutcome::Fatal(e.to_string()),
        };

        let topics_path = ctx.app.paths.transcription_topics(ctx.user_slug(), recording.id);
        let extracted_path = ctx.app.paths.transcription_extracted(ctx.user_slug(), recording.id);

        let topics_json = match serde_json::to_string_pretty(&outline) {
            Ok(json) => json,
            Err(e) => return StageOutcome::Fatal(format!("cannot serialize topics: {}", e)),
        };
        if let Err(e) = std::fs::write(&topics_path, &topics_json) {
            return StageOutcome::Retryable(format!("cannot write topics.json: {}", e));
        }

        let export = json!({
            "topics": outline.topics,
            "granularity": granularity,
            "source_language": transcript.language,
        });
        if let Err(e) = std::fs::write(&extracted_path, export.to_string()) {
            return StageOutcome::Retryable(format!("cannot write extracted.json: {}", e));
        }

        StageOutcome::Ok(json!({ "topics": outline.topics.len() }))
    }
}
