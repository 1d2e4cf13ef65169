// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing Configuration
//!
//! Typed views over the JSON processing preferences a recording carries.
//! The stored form stays an opaque `serde_json::Value` so that templates,
//! automation overrides, and manual PATCHes can layer freely; this module
//! owns the two operations the core needs on that value:
//!
//! - **deep merge** - template config over recording preferences, automation
//!   override over both. Maps merge recursively, everything else replaces.
//! - **typed parse** - the orchestrator reads the merged value through
//!   [`ProcessingConfig`] to plan the required stage set. Unknown keys are
//!   preserved in the stored value and simply ignored by the typed view.
//!
//! Precedence, lowest to highest: base config < template `processing_config`
//! < recording preferences PATCH < automation job override.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FlowError;

/// Deep-merges `overlay` over `base`. Objects merge key-by-key recursively;
/// any other value (including arrays) replaces the base value wholesale.
pub fn merge_configs(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in overlay_map {
                let slot = match merged.get(key) {
                    Some(existing) => merge_configs(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), slot);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Topics granularity requested from the topic extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Short,
    Medium,
    #[default]
    Long,
}

/// Transcription, topics, and subtitle settings (one flat object,
/// historically grouped under the `transcription` key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    #[serde(alias = "enable")]
    pub enable_transcription: bool,
    pub language: Option<String>,
    pub prompt: Option<String>,
    /// Continue the pipeline when transcription fails; dependent stages are
    /// then skipped instead of rolling the recording back to DOWNLOADED.
    pub allow_errors: bool,
    pub enable_topics: bool,
    pub granularity: Granularity,
    /// Key terms to bias the transcriber (names, abbreviations).
    pub vocabulary: Option<Vec<String>>,
    pub enable_subtitles: bool,
    pub subtitle_formats: Vec<String>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            enable_transcription: true,
            language: None,
            prompt: None,
            allow_errors: false,
            enable_topics: true,
            granularity: Granularity::Long,
            vocabulary: None,
            enable_subtitles: true,
            subtitle_formats: vec!["srt".to_string(), "vtt".to_string()],
        }
    }
}

/// Video trimming settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimmingSettings {
    pub enable_trimming: bool,
    pub audio_detection: bool,
    /// Silence threshold in dB for audio detection.
    pub silence_threshold: f64,
    pub min_silence_duration: f64,
    pub padding_before: f64,
    pub padding_after: f64,
    pub remove_intro: bool,
    pub remove_outro: bool,
    pub intro_duration: f64,
    pub outro_duration: f64,
    pub output_format: String,
}

impl Default for TrimmingSettings {
    fn default() -> Self {
        Self {
            enable_trimming: true,
            audio_detection: true,
            silence_threshold: -40.0,
            min_silence_duration: 2.0,
            padding_before: 5.0,
            padding_after: 5.0,
            remove_intro: false,
            remove_outro: false,
            intro_duration: 30.0,
            outro_duration: 30.0,
            output_format: "mp4".to_string(),
        }
    }
}

/// Output (upload) settings attached by a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub preset_ids: Vec<i64>,
    #[serde(default)]
    pub auto_upload: bool,
    #[serde(default = "default_true")]
    pub upload_captions: bool,
}

fn default_true() -> bool {
    true
}

impl OutputConfig {
    /// Preset-list invariants enforced at template write time.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.preset_ids.is_empty() {
            return Err(FlowError::validation("preset_ids cannot be empty"));
        }
        if self.preset_ids.len() > 10 {
            return Err(FlowError::validation("at most 10 presets per template"));
        }
        if self.preset_ids.iter().any(|id| *id <= 0) {
            return Err(FlowError::validation("preset_ids must be positive"));
        }
        let mut seen = self.preset_ids.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.preset_ids.len() {
            return Err(FlowError::validation("preset_ids must be unique"));
        }
        Ok(())
    }
}

/// Typed view over merged processing preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProcessingConfig {
    pub transcription: Option<TranscriptionSettings>,
    pub trimming: Option<TrimmingSettings>,
    pub output_config: Option<OutputConfig>,
}

impl ProcessingConfig {
    /// Parses the stored preferences value; absent sections stay `None`.
    pub fn from_value(value: &Value) -> Result<Self, FlowError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| FlowError::Serialization(format!("invalid processing preferences: {}", e)))
    }

    pub fn transcription_enabled(&self) -> bool {
        self.transcription.as_ref().is_some_and(|t| t.enable_transcription)
    }

    pub fn topics_enabled(&self) -> bool {
        self.transcription
            .as_ref()
            .is_some_and(|t| t.enable_transcription && t.enable_topics)
    }

    pub fn subtitles_enabled(&self) -> bool {
        self.transcription
            .as_ref()
            .is_some_and(|t| t.enable_transcription && t.enable_subtitles)
    }

    pub fn trimming_enabled(&self) -> bool {
        self.trimming.as_ref().is_some_and(|t| t.enable_trimming)
    }

    pub fn upload_enabled(&self) -> bool {
        self.output_config
            .as_ref()
            .is_some_and(|o| o.auto_upload && !o.preset_ids.is_empty())
    }

    pub fn allow_transcription_errors(&self) -> bool {
        self.transcription.as_ref().is_some_and(|t| t.allow_errors)
    }
}

/// Supported subtitle render formats.
pub const SUBTITLE_FORMATS: &[&str] = &["srt", "vtt", "txt"];

/// Validates a subtitle format list against [`SUBTITLE_FORMATS`].
pub fn validate_subtitle_formats(formats: &[String]) -> Result<(), FlowError> {
    for format in formats {
        if !SUBTITLE_FORMATS.contains(&format.as_str()) {
            return Err(FlowError::validation(format!(
                "unsupported subtitle format '{}', allowed: {:?}",
                format, SUBTITLE_FORMATS
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_merge_recurses_into_maps() {
        let base = json!({"transcription": {"language": "en", "enable_topics": true}});
        let overlay = json!({"transcription": {"language": "ru"}});
        let merged = merge_configs(&base, &overlay);
        assert_eq!(merged["transcription"]["language"], "ru");
        assert_eq!(merged["transcription"]["enable_topics"], true);
    }

    #[test]
    fn test_merge_replaces_non_map_values() {
        let base = json!({"output_config": {"preset_ids": [1, 2]}});
        let overlay = json!({"output_config": {"preset_ids": [7]}});
        let merged = merge_configs(&base, &overlay);
        assert_eq!(merged["output_config"]["preset_ids"], json!([7]));
    }

    #[test]
    fn test_typed_view_with_enable_alias() {
        let value = json!({"transcription": {"enable": true, "language": "ru"}});
        let config = ProcessingConfig::from_value(&value).unwrap();
        assert!(config.transcription_enabled());
        assert_eq!(config.transcription.unwrap().language.as_deref(), Some("ru"));
    }

    #[test]
    fn test_absent_sections_disable_stages() {
        let config = ProcessingConfig::from_value(&Value::Null).unwrap();
        assert!(!config.transcription_enabled());
        assert!(!config.trimming_enabled());
        assert!(!config.upload_enabled());
    }

    #[test]
    fn test_output_config_validation() {
        let empty = OutputConfig {
            preset_ids: vec![],
            auto_upload: true,
            upload_captions: true,
        };
        assert!(empty.validate().is_err());

        let duplicated = OutputConfig {
            preset_ids: vec![3, 3],
            auto_upload: true,
            upload_captions: true,
        };
        assert!(duplicated.validate().is_err());

        let ok = OutputConfig {
            preset_ids: vec![7],
            auto_upload: true,
            upload_captions: true,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_subtitle_format_validation() {
        assert!(validate_subtitle_formats(&["srt".into(), "vtt".into()]).is_ok());
        assert!(validate_subtitle_formats(&["ass".into()]).is_err());
    }

    // Small generator for flat-ish JSON objects with scalar leaves.
    fn arb_config(keys: &'static [&'static str]) -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{1,6}".prop_map(Value::String),
        ];
        proptest::collection::btree_map(proptest::sample::select(keys.to_vec()), leaf, 0..keys.len()).prop_map(|m| {
            Value::Object(m.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
        })
    }

    proptest! {
        // merge(merge(A,B),C) == merge(A, merge(B,C)) when B and C touch
        // disjoint keys.
        #[test]
        fn prop_merge_associative_on_disjoint_keys(
            a in arb_config(&["p", "q", "r", "s"]),
            b in arb_config(&["p", "q"]),
            c in arb_config(&["r", "s"]),
        ) {
            let left = merge_configs(&merge_configs(&a, &b), &c);
            let right = merge_configs(&a, &merge_configs(&b, &c));
            prop_assert_eq!(left, right);
        }

        // Merging with an empty overlay is the identity.
        #[test]
        fn prop_merge_empty_identity(a in arb_config(&["p", "q", "r"])) {
            prop_assert_eq!(merge_configs(&a, &json!({})), a);
        }
    }
}
