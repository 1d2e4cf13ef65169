// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects: immutable, validated types shared across entities.

pub mod period;
pub mod processing_config;
pub mod quota;
pub mod schedule;
pub mod user_id;

pub use period::Period;
pub use processing_config::{
    merge_configs, Granularity, OutputConfig, ProcessingConfig, TranscriptionSettings, TrimmingSettings,
};
pub use quota::{Admission, EffectiveQuotas, QuotaLimit, ResourceUsage};
pub use schedule::Schedule;
pub use user_id::UserId;
