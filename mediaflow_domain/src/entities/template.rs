// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recording Templates
//!
//! A template bundles matching rules with processing and output
//! configuration. When discovery brings in a recording, the matcher selects
//! at most one template, deep-merges its `processing_config` into the
//! recording's preferences, and attaches its `output_config` verbatim.
//!
//! ## Matching Rules
//!
//! All rule kinds are optional and ORed against each other; within a kind,
//! any entry matching is enough:
//!
//! - `exact_matches` - case-insensitive equality on the display name
//! - `keywords` - case-insensitive substring on the display name
//! - `patterns` - regular expressions against the display name, validated
//!   when the template is written
//! - `source_ids` - membership of the recording's input source
//!
//! A non-draft template must carry at least one populated rule kind;
//! otherwise it could match nothing and silently absorb `used_count`.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;
use crate::value_objects::{OutputConfig, UserId};

/// Matching rules for automatic template selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MatchingRules {
    pub exact_matches: Vec<String>,
    pub keywords: Vec<String>,
    pub patterns: Vec<String>,
    pub source_ids: Vec<i64>,
}

impl MatchingRules {
    /// True when no rule kind is populated.
    pub fn is_empty(&self) -> bool {
        self.exact_matches.is_empty()
            && self.keywords.is_empty()
            && self.patterns.is_empty()
            && self.source_ids.is_empty()
    }

    /// Compiles every pattern, surfacing the first invalid one.
    pub fn validate(&self) -> Result<(), FlowError> {
        for pattern in &self.patterns {
            RegexBuilder::new(pattern)
                .build()
                .map_err(|e| FlowError::validation(format!("invalid pattern '{}': {}", pattern, e)))?;
        }
        Ok(())
    }

    /// Evaluates the rules against a recording's display name and source.
    pub fn matches(&self, display_name: &str, input_source_id: Option<i64>) -> bool {
        let lowered = display_name.to_lowercase();

        if self.exact_matches.iter().any(|m| m.to_lowercase() == lowered) {
            return true;
        }
        if self.keywords.iter().any(|k| lowered.contains(&k.to_lowercase())) {
            return true;
        }
        if self.patterns.iter().any(|p| {
            RegexBuilder::new(p)
                .build()
                .map(|re| re.is_match(display_name))
                .unwrap_or(false)
        }) {
            return true;
        }
        if let Some(source_id) = input_source_id {
            if self.source_ids.contains(&source_id) {
                return true;
            }
        }
        false
    }
}

/// Matching + processing spec applied to discovered recordings.
///
/// Unique by `(user, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingTemplate {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub matching_rules: Option<MatchingRules>,
    /// Free-form processing overlay, deep-merged into recording preferences.
    pub processing_config: Option<Value>,
    /// Content metadata overlay (title templates, playlists); opaque here.
    pub metadata_config: Option<Value>,
    pub output_config: Option<OutputConfig>,
    pub is_draft: bool,
    pub is_active: bool,
    pub used_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordingTemplate {
    /// Write-time invariants shared by create and update paths.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.name.trim().len() < 3 {
            return Err(FlowError::validation("template name must be at least 3 characters"));
        }

        if let Some(rules) = &self.matching_rules {
            rules.validate()?;
        }

        if !self.is_draft {
            let has_rule = self.matching_rules.as_ref().is_some_and(|r| !r.is_empty());
            if !has_rule {
                return Err(FlowError::validation(
                    "non-draft template requires at least one matching rule \
                     (exact_matches, keywords, patterns or source_ids)",
                ));
            }
        }

        if let Some(output) = &self.output_config {
            output.validate()?;
            if output.auto_upload && self.processing_config.is_none() {
                return Err(FlowError::validation("auto_upload requires a processing_config"));
            }
        }

        Ok(())
    }

    /// Whether the template participates in automation matching at all.
    pub fn is_matchable(&self) -> bool {
        !self.is_draft && self.is_active
    }

    /// Evaluates this template's rules against a recording.
    pub fn matches(&self, display_name: &str, input_source_id: Option<i64>) -> bool {
        self.matching_rules
            .as_ref()
            .is_some_and(|rules| rules.matches(display_name, input_source_id))
    }
}
