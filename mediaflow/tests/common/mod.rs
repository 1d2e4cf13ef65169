// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared integration-test harness: in-memory database, temp storage root,
//! a pinned manual clock, and scriptable collaborator mocks.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mediaflow_bootstrap::{CancellationToken, ShutdownCoordinator};
use mediaflow_domain::services::{
    AudioReport, CandidateRecording, Clock, FetchReport, ListFilters, ManualClock, MediaProcessor, SourceAdapter,
    TargetAdapter, TopicExtractor, TopicOutline, TranscribeRequest, Transcriber, Transcript, TranscriptSegment,
    TrimReport, UploadReceipt, UploadRequest,
};
use mediaflow_domain::{
    FlowError, Granularity, InputSource, MatchingRules, OutputConfig, OutputPreset, RecordingTemplate, SourceType,
    SubscriptionPlan, TargetPlatform, TrimmingSettings, User, UserId, UserSubscription,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use mediaflow::application::services::{
    AutomationService, PipelineOrchestrator, QuotaLedger, SourceDiscovery, TemplateMatcher,
};
use mediaflow::application::ServiceApi;
use mediaflow::context::AppContext;
use mediaflow::infrastructure::config::AppConfig;
use mediaflow::infrastructure::metrics::FlowMetrics;
use mediaflow::infrastructure::repositories::schema;
use mediaflow::infrastructure::runtime::{AutomationScheduler, Janitor, StageExecutor};

pub type Hook = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A minimal but valid MP4 payload for download validation.
pub fn valid_mp4(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    data.extend_from_slice(&[0, 0, 0, 32]);
    data.extend_from_slice(b"ftypisom");
    data.resize(len.max(2048), 0xAB);
    data
}

/// One scripted fetch behavior.
pub enum FetchStep {
    Deliver(Vec<u8>),
    Retryable(String),
    Fatal(String),
}

/// Scriptable source adapter: candidates are set by the test, fetches play
/// back a script (delivering a valid MP4 once the script runs dry).
pub struct ScriptedSource {
    pub candidates: Mutex<Vec<CandidateRecording>>,
    pub fetch_script: Mutex<VecDeque<FetchStep>>,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(Vec::new()),
            fetch_script: Mutex::new(VecDeque::new()),
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_candidates(&self, candidates: Vec<CandidateRecording>) {
        *self.candidates.lock().unwrap() = candidates;
    }

    pub fn script_fetches(&self, steps: Vec<FetchStep>) {
        *self.fetch_script.lock().unwrap() = steps.into();
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn source_type(&self) -> SourceType {
        SourceType::ExternalUrl
    }

    async fn list(
        &self,
        _source: &InputSource,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
        _filters: &ListFilters,
    ) -> Result<Vec<CandidateRecording>, FlowError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.lock().unwrap().clone())
    }

    async fn fetch(
        &self,
        _source: &InputSource,
        _source_key: &str,
        dest: &Path,
        _resume_from: u64,
    ) -> Result<FetchReport, FlowError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.fetch_script.lock().unwrap().pop_front();
        match step {
            Some(FetchStep::Retryable(msg)) => Err(FlowError::retryable(msg)),
            Some(FetchStep::Fatal(msg)) => Err(FlowError::fatal_external(msg)),
            Some(FetchStep::Deliver(bytes)) => {
                std::fs::write(dest, &bytes)?;
                Ok(FetchReport {
                    bytes_written: bytes.len() as u64,
                    resumed: false,
                })
            }
            None => {
                let bytes = valid_mp4(4096);
                std::fs::write(dest, &bytes)?;
                Ok(FetchReport {
                    bytes_written: bytes.len() as u64,
                    resumed: false,
                })
            }
        }
    }
}

/// Target adapter that records every delivered upload.
pub struct RecordingTarget {
    pub uploads: Mutex<Vec<UploadRequest>>,
    pub fail_next: Mutex<VecDeque<FlowError>>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            fail_next: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl TargetAdapter for RecordingTarget {
    fn platform(&self) -> TargetPlatform {
        TargetPlatform::Youtube
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, FlowError> {
        if let Some(err) = self.fail_next.lock().unwrap().pop_front() {
            return Err(err);
        }
        let count = {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(request.clone());
            uploads.len()
        };
        Ok(UploadReceipt {
            remote_id: format!("yt-{}", count),
            url: Some(format!("https://video.example/{}", count)),
            meta: Value::Null,
        })
    }
}

/// Transcriber mock with an optional one-shot hook that runs mid-call
/// (used to soft-delete or pause a recording while the stage is in flight).
pub struct MockTranscriber {
    pub hook: tokio::sync::Mutex<Option<Hook>>,
    pub calls: AtomicUsize,
    pub fail_script: Mutex<VecDeque<FlowError>>,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self {
            hook: tokio::sync::Mutex::new(None),
            calls: AtomicUsize::new(0),
            fail_script: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn set_hook(&self, hook: Hook) {
        *self.hook.lock().await = Some(hook);
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _request: &TranscribeRequest) -> Result<Transcript, FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.hook.lock().await.take() {
            hook.await;
        }
        if let Some(err) = self.fail_script.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Transcript {
            language: Some("ru".into()),
            duration_seconds: 3600.0,
            segments: vec![
                TranscriptSegment {
                    start_seconds: 0.0,
                    end_seconds: 5.0,
                    text: "Добро пожаловать".into(),
                },
                TranscriptSegment {
                    start_seconds: 5.0,
                    end_seconds: 12.0,
                    text: "Начнём лекцию".into(),
                },
            ],
            words: Vec::new(),
        })
    }
}

/// Topic extractor mock.
pub struct MockTopics;

#[async_trait]
impl TopicExtractor for MockTopics {
    async fn extract(&self, _transcript: &Transcript, _granularity: Granularity) -> Result<TopicOutline, FlowError> {
        Ok(TopicOutline {
            topics: vec![mediaflow_domain::services::Topic {
                title: "Introduction".into(),
                start_seconds: 0.0,
                end_seconds: Some(12.0),
                summary: None,
            }],
            raw: Value::Null,
        })
    }
}

/// Media processor mock: trim copies the file, audio extraction writes a
/// small placeholder track. Supports the same one-shot hook as the
/// transcriber.
pub struct MockProcessor {
    pub hook: tokio::sync::Mutex<Option<Hook>>,
    pub trim_calls: AtomicUsize,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self {
            hook: tokio::sync::Mutex::new(None),
            trim_calls: AtomicUsize::new(0),
        }
    }

    pub async fn set_hook(&self, hook: Hook) {
        *self.hook.lock().await = Some(hook);
    }
}

#[async_trait]
impl MediaProcessor for MockProcessor {
    async fn trim(&self, input: &Path, output: &Path, _settings: &TrimmingSettings) -> Result<TrimReport, FlowError> {
        self.trim_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.hook.lock().await.take() {
            hook.await;
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(input, output)?;
        Ok(TrimReport {
            trimmed_head_seconds: 2.0,
            trimmed_tail_seconds: 1.0,
            final_duration_seconds: 3597.0,
        })
    }

    async fn extract_audio(&self, _input: &Path, output: &Path) -> Result<AudioReport, FlowError> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, vec![0u8; 2048])?;
        Ok(AudioReport {
            duration_seconds: 3597.0,
            size_bytes: 2048,
        })
    }
}

/// The wired test world.
pub struct Harness {
    pub app: Arc<AppContext>,
    pub pool: SqlitePool,
    pub clock: ManualClock,
    pub storage: TempDir,
    pub user: User,
    pub plan: SubscriptionPlan,

    pub source_adapter: Arc<ScriptedSource>,
    pub target_adapter: Arc<RecordingTarget>,
    pub transcriber: Arc<MockTranscriber>,
    pub processor: Arc<MockProcessor>,

    pub ledger: QuotaLedger,
    pub discovery: SourceDiscovery,
    pub matcher: TemplateMatcher,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub automation: AutomationService,
    pub api: ServiceApi,
    pub scheduler: AutomationScheduler,
    pub janitor: Janitor,
}

pub fn start_of_march() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

impl Harness {
    pub async fn new() -> Self {
        let pool = schema::memory_pool().await.expect("memory pool");
        let storage = tempfile::tempdir().expect("storage root");
        let clock = ManualClock::at(start_of_march());

        let config = AppConfig {
            storage: mediaflow::infrastructure::config::StorageConfig {
                root: storage.path().to_path_buf(),
            },
            ..AppConfig::default()
        };
        let metrics = FlowMetrics::new().expect("metrics");

        let source_adapter = Arc::new(ScriptedSource::new());
        let target_adapter = Arc::new(RecordingTarget::new());
        let transcriber = Arc::new(MockTranscriber::new());
        let processor = Arc::new(MockProcessor::new());

        let app = Arc::new(
            AppContext::with_clock(pool.clone(), config, metrics, Arc::new(clock.clone()))
                .with_source_adapter(source_adapter.clone())
                .with_target_adapter(target_adapter.clone())
                .with_transcriber(transcriber.clone())
                .with_topic_extractor(Arc::new(MockTopics))
                .with_media_processor(processor.clone()),
        );

        let ledger = QuotaLedger::new(app.clone());
        let executor = Arc::new(StageExecutor::new(app.clone(), ledger.clone()));
        let orchestrator = Arc::new(PipelineOrchestrator::new(app.clone(), executor));
        let discovery = SourceDiscovery::new(app.clone(), ledger.clone());
        let matcher = TemplateMatcher::new(app.clone());
        let automation = AutomationService::new(
            app.clone(),
            ledger.clone(),
            discovery.clone(),
            matcher.clone(),
            orchestrator.clone(),
        );
        let api = ServiceApi::new(app.clone(), ledger.clone(), automation.clone());
        let scheduler = AutomationScheduler::new(app.clone(), automation.clone(), ledger.clone());
        let janitor = Janitor::new(app.clone());

        // Tenant on a plan of 100 recordings / 50 GB / 4 tasks / 5 jobs /
        // min 6h automation interval.
        let now = clock.now();
        let slug = app.users.allocate_slug(now).await.expect("slug");
        let user = User::register(UserId::generate(), slug, "tenant@example.test", now);
        app.users.insert(&user).await.expect("user");

        let mut plan = SubscriptionPlan {
            id: 0,
            name: "pro".into(),
            display_name: "Pro".into(),
            description: None,
            included_recordings_per_month: Some(100),
            included_storage_gb: Some(50),
            max_concurrent_tasks: Some(4),
            max_automation_jobs: Some(5),
            min_automation_interval_hours: Some(6),
            is_active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        };
        plan.id = app.subscriptions.insert_plan(&plan).await.expect("plan");
        app.subscriptions
            .upsert_subscription(&UserSubscription {
                id: 0,
                user_id: user.id,
                plan_id: plan.id,
                custom_max_recordings_per_month: None,
                custom_max_storage_gb: None,
                custom_max_concurrent_tasks: None,
                custom_max_automation_jobs: None,
                custom_min_automation_interval_hours: None,
                starts_at: now,
                expires_at: None,
                notes: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("subscription");

        Self {
            app,
            pool,
            clock,
            storage,
            user,
            plan,
            source_adapter,
            target_adapter,
            transcriber,
            processor,
            ledger,
            discovery,
            matcher,
            orchestrator,
            automation,
            api,
            scheduler,
            janitor,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        ShutdownCoordinator::default().token()
    }

    pub async fn create_source(&self) -> InputSource {
        let now = self.clock.now();
        let mut source = InputSource {
            id: 0,
            user_id: self.user.id,
            name: "conference-cloud".into(),
            description: None,
            source_type: SourceType::ExternalUrl,
            credential_id: None,
            config: Value::Null,
            is_active: true,
            last_sync_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        };
        source.id = self.app.sources.insert(&source).await.expect("source");
        source
    }

    pub async fn create_preset(&self) -> OutputPreset {
        let now = self.clock.now();
        let mut preset = OutputPreset {
            id: 0,
            user_id: self.user.id,
            name: "main-channel".into(),
            description: None,
            platform: TargetPlatform::Youtube,
            credential_id: 1,
            preset_metadata: json!({ "privacy": "unlisted" }),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        preset.id = self.app.presets.insert(&preset).await.expect("preset");
        preset
    }

    pub async fn create_template(
        &self,
        rules: MatchingRules,
        processing_config: Value,
        output: Option<OutputConfig>,
    ) -> RecordingTemplate {
        static TEMPLATE_SEQ: AtomicUsize = AtomicUsize::new(0);
        let now = self.clock.now();
        let mut template = RecordingTemplate {
            id: 0,
            user_id: self.user.id,
            name: format!("template-{}", TEMPLATE_SEQ.fetch_add(1, Ordering::SeqCst)),
            description: None,
            matching_rules: Some(rules),
            processing_config: Some(processing_config),
            metadata_config: None,
            output_config: output,
            is_draft: false,
            is_active: true,
            used_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };
        template.validate().expect("valid template");
        template.id = self.app.templates.insert(&template).await.expect("template");
        template
    }

    pub fn candidate(&self, key: &str, name: &str, duration: f64) -> CandidateRecording {
        CandidateRecording {
            source_key: key.into(),
            display_name: name.into(),
            start_time: self.clock.now(),
            duration,
            size_bytes: None,
            finalized: true,
            blank: false,
            raw: json!({ "key": key }),
        }
    }
}
