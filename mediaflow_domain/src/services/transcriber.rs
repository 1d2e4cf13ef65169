// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transcription and Topic Extraction Ports
//!
//! The model calls themselves are external collaborators; the core sees two
//! capabilities returning structured results. Rendering those results into
//! the cache formats (segment lines, SRT, VTT) is core logic and lives here,
//! next to the types it renders.
//!
//! Cache line format: `[HH:MM:SS.mmm - HH:MM:SS.mmm] text`.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FlowError;
use crate::value_objects::processing_config::Granularity;

/// One timed segment of speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

/// One timed word, when the provider reports word-level timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub word: String,
}

/// Structured transcription result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Transcript {
    pub language: Option<String>,
    pub duration_seconds: f64,
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub words: Vec<WordTiming>,
}

impl Transcript {
    /// Full text with segment boundaries collapsed to spaces.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Segment cache lines: `[HH:MM:SS.mmm - HH:MM:SS.mmm] text`.
    pub fn segment_lines(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&format!(
                "[{} - {}] {}\n",
                format_timestamp(segment.start_seconds),
                format_timestamp(segment.end_seconds),
                segment.text.trim()
            ));
        }
        out
    }

    /// Word cache lines, same bracket format as segments.
    pub fn word_lines(&self) -> String {
        let mut out = String::new();
        for word in &self.words {
            out.push_str(&format!(
                "[{} - {}] {}\n",
                format_timestamp(word.start_seconds),
                format_timestamp(word.end_seconds),
                word.word
            ));
        }
        out
    }

    /// SubRip rendering.
    pub fn render_srt(&self) -> String {
        let mut out = String::new();
        for (index, segment) in self.segments.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                index + 1,
                format_srt_timestamp(segment.start_seconds),
                format_srt_timestamp(segment.end_seconds),
                segment.text.trim()
            ));
        }
        out
    }

    /// WebVTT rendering.
    pub fn render_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for segment in &self.segments {
            out.push_str(&format!(
                "{} --> {}\n{}\n\n",
                format_timestamp(segment.start_seconds),
                format_timestamp(segment.end_seconds),
                segment.text.trim()
            ));
        }
        out
    }
}

/// `HH:MM:SS.mmm` (dot separator; used by VTT and the cache files).
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

/// `HH:MM:SS,mmm` (comma separator; SubRip wants it this way).
pub fn format_srt_timestamp(seconds: f64) -> String {
    format_timestamp(seconds).replace('.', ",")
}

/// Transcription request, paths and knobs resolved by the stage action.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeRequest {
    pub audio_path: PathBuf,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub vocabulary: Vec<String>,
}

/// Speech-to-text capability.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, request: &TranscribeRequest) -> Result<Transcript, FlowError>;
}

/// One extracted topic with its time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub start_seconds: f64,
    pub end_seconds: Option<f64>,
    pub summary: Option<String>,
}

/// Structured topic extraction result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TopicOutline {
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub raw: Value,
}

/// Topic extraction capability over a finished transcript.
#[async_trait]
pub trait TopicExtractor: Send + Sync {
    async fn extract(&self, transcript: &Transcript, granularity: Granularity) -> Result<TopicOutline, FlowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        Transcript {
            language: Some("ru".into()),
            duration_seconds: 125.5,
            segments: vec![
                TranscriptSegment {
                    start_seconds: 0.0,
                    end_seconds: 4.2,
                    text: "Hello everyone".into(),
                },
                TranscriptSegment {
                    start_seconds: 4.2,
                    end_seconds: 9.75,
                    text: "welcome to the lecture".into(),
                },
            ],
            words: vec![WordTiming {
                start_seconds: 0.0,
                end_seconds: 0.5,
                word: "Hello".into(),
            }],
        }
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(4.2), "00:00:04.200");
        assert_eq!(format_timestamp(3661.007), "01:01:01.007");
        assert_eq!(format_srt_timestamp(4.2), "00:00:04,200");
    }

    #[test]
    fn test_timestamp_clamps_negative() {
        assert_eq!(format_timestamp(-1.0), "00:00:00.000");
    }

    #[test]
    fn test_segment_lines_format() {
        let lines = transcript().segment_lines();
        assert!(lines.starts_with("[00:00:00.000 - 00:00:04.200] Hello everyone\n"));
        assert!(lines.contains("[00:00:04.200 - 00:00:09.750] welcome to the lecture\n"));
    }

    #[test]
    fn test_srt_rendering() {
        let srt = transcript().render_srt();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:04,200\nHello everyone\n\n"));
        assert!(srt.contains("2\n00:00:04,200 --> 00:00:09,750\n"));
    }

    #[test]
    fn test_vtt_rendering() {
        let vtt = transcript().render_vtt();
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:04.200\nHello everyone\n"));
    }

    #[test]
    fn test_plain_text_joins_segments() {
        assert_eq!(transcript().plain_text(), "Hello everyone welcome to the lecture");
    }
}
