// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Mediaflow Domain
//!
//! Pure domain layer of the mediaflow media automation platform: entities,
//! value objects, collaborator ports, and the error taxonomy. This crate has
//! no runtime, no database driver, and no I/O of its own - infrastructure
//! implements the ports defined here.
//!
//! ## Layout
//!
//! - [`entities`] - typed aggregates (users, recordings, stages, targets,
//!   templates, automation jobs) referencing each other by ID
//! - [`value_objects`] - validated immutable types (IDs, periods, schedules,
//!   quota limits, processing configuration)
//! - [`services`] - ports for external collaborators (source/target
//!   adapters, transcriber, topic extractor, media processor) and the
//!   injected clock
//! - [`error`] - the [`FlowError`] taxonomy shared by every layer

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

pub use error::FlowError;

// Frequently used types, re-exported at the crate root the way downstream
// code actually imports them.
pub use entities::{
    AutomationFilters, AutomationJob, DeleteState, DeletionReason, InputSource, MatchingRules, OutputPreset,
    OutputTarget, ProcessingStage, ProcessingStatus, QuotaUsage, Recording, RecordingTemplate, RefreshToken, Role,
    SourceMetadata, SourceType, StagePlan, StageStatus, StageTiming, StageType, SubscriptionPlan, SyncConfig,
    TargetPlatform, TargetStatus, TaskGauge, User, UserSubscription, CANONICAL_STAGE_ORDER,
};
pub use value_objects::{
    merge_configs, Admission, EffectiveQuotas, Granularity, OutputConfig, Period, ProcessingConfig, QuotaLimit,
    ResourceUsage, Schedule, TranscriptionSettings, TrimmingSettings, UserId,
};
