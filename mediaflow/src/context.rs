// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Context
//!
//! The dependency bundle every service is constructed from: repositories
//! over one shared pool, the storage path builder, the injected clock, the
//! metrics handle, and the external collaborators (adapters, transcriber,
//! topic extractor, media processor). There is no global state - workers
//! receive an `Arc<AppContext>` and nothing else.
//!
//! Collaborators are registered per platform; a platform without a
//! registered adapter is a configuration fact the stage actions surface as
//! skip/failure outcomes, not a panic.

use std::collections::HashMap;
use std::sync::Arc;

use mediaflow_domain::services::{Clock, MediaProcessor, SourceAdapter, SystemClock, TargetAdapter, TopicExtractor, Transcriber};
use mediaflow_domain::{SourceType, TargetPlatform};
use sqlx::SqlitePool;

use crate::infrastructure::config::AppConfig;
use crate::infrastructure::metrics::FlowMetrics;
use crate::infrastructure::repositories::{
    AutomationJobRepository, InputSourceRepository, OutputPresetRepository, OutputTargetRepository,
    RecordingRepository, SourceMetadataRepository, StageRepository, StageTimingRepository, SubscriptionRepository,
    TemplateRepository, UserRepository,
};
use crate::infrastructure::storage::StoragePaths;

/// Shared dependency bundle.
pub struct AppContext {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub paths: StoragePaths,
    pub metrics: FlowMetrics,

    pub users: UserRepository,
    pub subscriptions: SubscriptionRepository,
    pub sources: InputSourceRepository,
    pub source_meta: SourceMetadataRepository,
    pub presets: OutputPresetRepository,
    pub templates: TemplateRepository,
    pub jobs: AutomationJobRepository,
    pub recordings: RecordingRepository,
    pub stages: StageRepository,
    pub timings: StageTimingRepository,
    pub targets: OutputTargetRepository,

    source_adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
    target_adapters: HashMap<TargetPlatform, Arc<dyn TargetAdapter>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    topic_extractor: Option<Arc<dyn TopicExtractor>>,
    media_processor: Option<Arc<dyn MediaProcessor>>,
}

impl AppContext {
    /// Builds the context over a migrated pool with the system clock.
    pub fn new(pool: SqlitePool, config: AppConfig, metrics: FlowMetrics) -> Self {
        Self::with_clock(pool, config, metrics, Arc::new(SystemClock))
    }

    /// Builds the context with an injected clock (tests pin time here).
    pub fn with_clock(pool: SqlitePool, config: AppConfig, metrics: FlowMetrics, clock: Arc<dyn Clock>) -> Self {
        let paths = StoragePaths::new(config.storage.root.clone());
        Self {
            config,
            clock,
            paths,
            metrics,
            users: UserRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool.clone()),
            sources: InputSourceRepository::new(pool.clone()),
            source_meta: SourceMetadataRepository::new(pool.clone()),
            presets: OutputPresetRepository::new(pool.clone()),
            templates: TemplateRepository::new(pool.clone()),
            jobs: AutomationJobRepository::new(pool.clone()),
            recordings: RecordingRepository::new(pool.clone()),
            stages: StageRepository::new(pool.clone()),
            timings: StageTimingRepository::new(pool.clone()),
            targets: OutputTargetRepository::new(pool),
            source_adapters: HashMap::new(),
            target_adapters: HashMap::new(),
            transcriber: None,
            topic_extractor: None,
            media_processor: None,
        }
    }

    // --- collaborator registration (builder style) -----------------------

    pub fn with_source_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.source_adapters.insert(adapter.source_type(), adapter);
        self
    }

    pub fn with_target_adapter(mut self, adapter: Arc<dyn TargetAdapter>) -> Self {
        self.target_adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_topic_extractor(mut self, extractor: Arc<dyn TopicExtractor>) -> Self {
        self.topic_extractor = Some(extractor);
        self
    }

    pub fn with_media_processor(mut self, processor: Arc<dyn MediaProcessor>) -> Self {
        self.media_processor = Some(processor);
        self
    }

    // --- collaborator lookup ---------------------------------------------

    pub fn source_adapter(&self, source_type: SourceType) -> Option<Arc<dyn SourceAdapter>> {
        self.source_adapters.get(&source_type).cloned()
    }

    pub fn target_adapter(&self, platform: TargetPlatform) -> Option<Arc<dyn TargetAdapter>> {
        self.target_adapters.get(&platform).cloned()
    }

    pub fn transcriber(&self) -> Option<Arc<dyn Transcriber>> {
        self.transcriber.clone()
    }

    pub fn topic_extractor(&self) -> Option<Arc<dyn TopicExtractor>> {
        self.topic_extractor.clone()
    }

    pub fn media_processor(&self) -> Option<Arc<dyn MediaProcessor>> {
        self.media_processor.clone()
    }
}
