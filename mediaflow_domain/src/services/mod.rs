// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain service ports: the traits external collaborators implement, plus
//! the injected clock.

pub mod clock;
pub mod media_processor;
pub mod source_adapter;
pub mod target_adapter;
pub mod transcriber;

pub use clock::{Clock, ManualClock, SystemClock};
pub use media_processor::{AudioReport, MediaProcessor, TrimReport};
pub use source_adapter::{CandidateRecording, FetchReport, ListFilters, SourceAdapter};
pub use target_adapter::{TargetAdapter, UploadReceipt, UploadRequest};
pub use transcriber::{
    format_srt_timestamp, format_timestamp, Topic, TopicExtractor, TopicOutline, TranscribeRequest, Transcriber,
    Transcript, TranscriptSegment, WordTiming,
};
