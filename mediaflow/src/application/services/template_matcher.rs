// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Template Matcher
//!
//! Maps a discovered recording to at most one template. Candidates come
//! from the store already ranked (active non-drafts, most used first,
//! oldest first); the first whose rules match wins, and the win is stamped
//! onto the template's usage counters.
//!
//! The apply step deep-merges the template's `processing_config` over the
//! recording's existing preferences and attaches `output_config` verbatim
//! under the `output_config` key. The recording keeps the merged snapshot
//! forever - later template edits never rewrite history.

use std::sync::Arc;

use mediaflow_domain::{merge_configs, FlowError, Recording, RecordingTemplate, UserId};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::AppContext;

/// Recording-to-template matching service.
#[derive(Clone)]
pub struct TemplateMatcher {
    app: Arc<AppContext>,
}

impl TemplateMatcher {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }

    /// Finds the winning template for a display name and source, if any.
    /// Does not stamp usage; pair with [`Self::apply`] for that.
    pub async fn find_matching(
        &self,
        user_id: UserId,
        display_name: &str,
        input_source_id: Option<i64>,
    ) -> Result<Option<RecordingTemplate>, FlowError> {
        let candidates = self.app.templates.list_matchable(user_id).await?;
        for template in candidates {
            if template.matches(display_name, input_source_id) {
                debug!(template = template.id, name = %template.name, "template matched");
                return Ok(Some(template));
            }
        }
        Ok(None)
    }

    /// Applies a template to a recording: deep-merges processing config,
    /// attaches output config, stamps usage, and persists the snapshot.
    /// Returns the merged preferences.
    pub async fn apply(&self, recording: &Recording, template: &RecordingTemplate) -> Result<Value, FlowError> {
        let mut merged = recording.processing_preferences.clone();

        if let Some(processing) = &template.processing_config {
            merged = merge_configs(&merged, processing);
        }
        if let Some(output) = &template.output_config {
            let overlay = serde_json::json!({ "output_config": output });
            merged = merge_configs(&merged, &overlay);
        }

        let now = self.app.clock.now();
        self.app
            .recordings
            .apply_preferences(recording.id, &merged, Some(template.id), now)
            .await?;
        self.app.templates.record_use(template.id, now).await?;

        info!(recording = recording.id, template = template.id, "template applied");
        Ok(merged)
    }

    /// Convenience: find and apply in one step. Returns the applied
    /// template, or `None` when nothing matched.
    pub async fn match_and_apply(&self, recording: &Recording) -> Result<Option<RecordingTemplate>, FlowError> {
        let matched = self
            .find_matching(recording.user_id, &recording.display_name, recording.input_source_id)
            .await?;
        match matched {
            Some(template) => {
                self.apply(recording, &template).await?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }
}
