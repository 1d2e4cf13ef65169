// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Automation Service
//!
//! Job lifecycle (create, update, delete) with the full validation stack -
//! duplicate names, job quota, schedule minimum interval, template
//! integrity - plus the two execution paths the scheduler drives:
//! [`AutomationService::run_job`] (discovery → matching → pipeline) and
//! [`AutomationService::dry_run_job`] (the same pass, counts only, writes
//! nothing).
//!
//! Validation failures never mutate state: every check runs before the
//! first write.

use std::sync::Arc;

use futures::StreamExt;
use mediaflow_bootstrap::CancellationToken;
use mediaflow_domain::services::ListFilters;
use mediaflow_domain::{
    merge_configs, AutomationFilters, AutomationJob, FlowError, RecordingTemplate, Schedule, SyncConfig, UserId,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::application::services::discovery::{SourceDiscovery, SyncReport};
use crate::application::services::orchestrator::PipelineOrchestrator;
use crate::application::services::quota_ledger::QuotaLedger;
use crate::application::services::template_matcher::TemplateMatcher;
use crate::context::AppContext;

/// Input for job creation.
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub name: String,
    pub description: Option<String>,
    pub template_ids: Vec<i64>,
    pub schedule: Schedule,
    pub sync_config: SyncConfig,
    pub filters: AutomationFilters,
    pub processing_config: Option<Value>,
}

/// Partial update for an existing job; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub template_ids: Option<Vec<i64>>,
    pub schedule: Option<Schedule>,
    pub sync_config: Option<SyncConfig>,
    pub filters: Option<AutomationFilters>,
    pub processing_config: Option<Option<Value>>,
    pub is_active: Option<bool>,
}

/// Result of one live job run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunJobReport {
    pub sources_scanned: usize,
    pub discovered: usize,
    pub matched: usize,
    pub processed: usize,
    pub discovery: Vec<SyncReport>,
}

/// Result of a dry run: what a live run would have done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DryRunReport {
    pub sources_scanned: usize,
    pub estimated_new_recordings: usize,
    pub estimated_matched_recordings: usize,
    pub templates_to_apply: Vec<i64>,
}

/// Automation job management and execution.
#[derive(Clone)]
pub struct AutomationService {
    app: Arc<AppContext>,
    ledger: QuotaLedger,
    discovery: SourceDiscovery,
    matcher: TemplateMatcher,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl AutomationService {
    pub fn new(
        app: Arc<AppContext>,
        ledger: QuotaLedger,
        discovery: SourceDiscovery,
        matcher: TemplateMatcher,
        orchestrator: Arc<PipelineOrchestrator>,
    ) -> Self {
        Self {
            app,
            ledger,
            discovery,
            matcher,
            orchestrator,
        }
    }

    // --- lifecycle -------------------------------------------------------

    pub async fn create_job(&self, user_id: UserId, draft: JobDraft) -> Result<AutomationJob, FlowError> {
        if self.app.jobs.find_by_name(user_id, &draft.name).await?.is_some() {
            return Err(FlowError::conflict(format!(
                "automation job with name '{}' already exists",
                draft.name
            )));
        }

        let quotas = self.ledger.effective(user_id).await?;
        if let Some(reason) = self.ledger.check_automation_jobs(user_id).await?.reason() {
            return Err(FlowError::quota_denied(reason.to_string()));
        }

        let now = self.app.clock.now();
        let mut job = AutomationJob {
            id: 0,
            user_id,
            name: draft.name,
            description: draft.description,
            template_ids: draft.template_ids,
            schedule: draft.schedule,
            sync_config: draft.sync_config,
            filters: draft.filters,
            processing_config: draft.processing_config,
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            run_count: 0,
            created_at: now,
            updated_at: now,
        };

        job.validate(quotas.min_automation_interval_hours.as_option(), now)?;
        self.validate_templates(user_id, &job.template_ids).await?;
        job.next_run_at = job.schedule.next_fire_after(now)?;

        job.id = self.app.jobs.insert(&job).await?;
        info!(job = job.id, user = %user_id, next_run = ?job.next_run_at, "automation job created");
        Ok(job)
    }

    pub async fn update_job(&self, user_id: UserId, job_id: i64, update: JobUpdate) -> Result<AutomationJob, FlowError> {
        let mut job = self
            .app
            .jobs
            .find_owned(user_id, job_id)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("automation job {}", job_id)))?;

        if let Some(name) = &update.name {
            if *name != job.name && self.app.jobs.find_by_name(user_id, name).await?.is_some() {
                return Err(FlowError::conflict(format!("automation job with name '{}' already exists", name)));
            }
            job.name = name.clone();
        }
        if let Some(description) = update.description {
            job.description = description;
        }
        if let Some(template_ids) = update.template_ids {
            job.template_ids = template_ids;
        }
        let schedule_changed = update.schedule.is_some();
        if let Some(schedule) = update.schedule {
            job.schedule = schedule;
        }
        if let Some(sync_config) = update.sync_config {
            job.sync_config = sync_config;
        }
        if let Some(filters) = update.filters {
            job.filters = filters;
        }
        if let Some(processing_config) = update.processing_config {
            job.processing_config = processing_config;
        }
        if let Some(is_active) = update.is_active {
            job.is_active = is_active;
        }

        let now = self.app.clock.now();
        let quotas = self.ledger.effective(user_id).await?;
        job.validate(quotas.min_automation_interval_hours.as_option(), now)?;
        self.validate_templates(user_id, &job.template_ids).await?;

        if schedule_changed {
            job.next_run_at = job.schedule.next_fire_after(now)?;
        }
        job.updated_at = now;
        self.app.jobs.update(&job).await?;
        Ok(job)
    }

    pub async fn delete_job(&self, user_id: UserId, job_id: i64) -> Result<(), FlowError> {
        if !self.app.jobs.delete(user_id, job_id).await? {
            return Err(FlowError::not_found(format!("automation job {}", job_id)));
        }
        Ok(())
    }

    pub async fn get_job(&self, user_id: UserId, job_id: i64) -> Result<AutomationJob, FlowError> {
        self.app
            .jobs
            .find_owned(user_id, job_id)
            .await?
            .ok_or_else(|| FlowError::not_found(format!("automation job {}", job_id)))
    }

    pub async fn list_jobs(&self, user_id: UserId) -> Result<Vec<AutomationJob>, FlowError> {
        self.app.jobs.list_for_user(user_id).await
    }

    /// Referenced templates must exist, be active, and not be drafts.
    async fn validate_templates(&self, user_id: UserId, template_ids: &[i64]) -> Result<(), FlowError> {
        if template_ids.is_empty() {
            return Err(FlowError::validation("template_ids cannot be empty"));
        }
        let templates = self.app.templates.find_by_ids(user_id, template_ids).await?;
        if templates.len() != template_ids.len() {
            let found: Vec<i64> = templates.iter().map(|t| t.id).collect();
            let missing: Vec<i64> = template_ids.iter().copied().filter(|id| !found.contains(id)).collect();
            return Err(FlowError::not_found(format!("templates not found: {:?}", missing)));
        }
        let inactive: Vec<i64> = templates.iter().filter(|t| !t.is_active).map(|t| t.id).collect();
        if !inactive.is_empty() {
            return Err(FlowError::validation(format!("templates are inactive: {:?}", inactive)));
        }
        let drafts: Vec<i64> = templates.iter().filter(|t| t.is_draft).map(|t| t.id).collect();
        if !drafts.is_empty() {
            return Err(FlowError::validation(format!("templates are drafts: {:?}", drafts)));
        }
        Ok(())
    }

    // --- execution -------------------------------------------------------

    /// One live job run: discovery over the job's sources, template
    /// matching over the selected recordings, then pipeline runs bounded by
    /// the configured parallelism.
    pub async fn run_job(&self, job: &AutomationJob, cancel: &CancellationToken) -> Result<RunJobReport, FlowError> {
        let mut report = RunJobReport::default();
        let templates = self.job_templates(job).await?;
        let sources = self.job_sources(job, &templates).await?;
        let now = self.app.clock.now();

        for source in &sources {
            if cancel.is_cancelled() {
                break;
            }
            let since = job.since_for(source.last_sync_at, now);
            match self.discovery.sync_source(source, since, now, &ListFilters::default()).await {
                Ok(sync) => {
                    report.discovered += sync.created;
                    report.discovery.push(sync);
                }
                Err(e) => {
                    // Discovery errors stay on the source row; the job run
                    // itself continues with the remaining sources.
                    warn!(job = job.id, source = source.id, error = %e, "discovery failed for source");
                }
            }
            report.sources_scanned += 1;
        }

        // Select and map the recordings this job is allowed to touch.
        let candidates = self.app.recordings.list_by_statuses(job.user_id, &job.filters.status).await?;
        let mut to_process = Vec::new();
        for recording in candidates {
            if !job.filters.selects(recording.status, recording.blank_record) {
                continue;
            }
            let matched = templates
                .iter()
                .find(|t| t.matches(&recording.display_name, recording.input_source_id));
            let Some(template) = matched else { continue };

            let mut merged = self.matcher.apply(&recording, template).await?;
            if let Some(override_config) = &job.processing_config {
                // The job override is the highest-precedence overlay.
                merged = merge_configs(&merged, override_config);
                self.app
                    .recordings
                    .apply_preferences(recording.id, &merged, None, self.app.clock.now())
                    .await?;
            }
            report.matched += 1;
            to_process.push(recording.id);
        }

        // Pipeline runs, bounded by the job's own max_parallel when its
        // override carries one, else the process-wide default.
        let max_parallel = job
            .max_parallel()
            .unwrap_or(self.app.config.scheduler.max_parallel_recordings)
            .max(1);
        let processed = futures::stream::iter(to_process)
            .map(|recording_id| {
                let orchestrator = self.orchestrator.clone();
                let cancel = cancel.clone();
                async move {
                    match orchestrator.process_recording(recording_id, &cancel).await {
                        Ok(_) => 1usize,
                        Err(e) => {
                            warn!(recording = recording_id, error = %e, "pipeline run failed");
                            0
                        }
                    }
                }
            })
            .buffer_unordered(max_parallel)
            .collect::<Vec<usize>>()
            .await;
        report.processed = processed.into_iter().sum();

        info!(
            job = job.id,
            sources = report.sources_scanned,
            discovered = report.discovered,
            matched = report.matched,
            processed = report.processed,
            "job run finished"
        );
        Ok(report)
    }

    /// The same pass as [`Self::run_job`], but read-only: counts what would
    /// happen without creating, matching, or processing anything.
    pub async fn dry_run_job(&self, job: &AutomationJob) -> Result<DryRunReport, FlowError> {
        let mut report = DryRunReport {
            templates_to_apply: job.template_ids.clone(),
            ..DryRunReport::default()
        };
        let templates = self.job_templates(job).await?;
        let sources = self.job_sources(job, &templates).await?;
        let now = self.app.clock.now();

        for source in &sources {
            let Some(adapter) = self.app.source_adapter(source.source_type) else {
                continue;
            };
            let since = job.since_for(source.last_sync_at, now);
            let candidates = adapter.list(source, since, now, &ListFilters::default()).await?;
            report.sources_scanned += 1;

            for candidate in &candidates {
                let existing = self
                    .app
                    .source_meta
                    .find_recording_by_key(source.user_id, source.source_type, &candidate.source_key)
                    .await?;
                // Mirrors the live pass: only a truly missing key would
                // create a recording; a hard-deleted match is skipped there.
                if existing.is_none() {
                    report.estimated_new_recordings += 1;
                }
                if templates.iter().any(|t| t.matches(&candidate.display_name, Some(source.id))) {
                    report.estimated_matched_recordings += 1;
                }
            }
        }
        Ok(report)
    }

    async fn job_templates(&self, job: &AutomationJob) -> Result<Vec<RecordingTemplate>, FlowError> {
        let mut templates = self.app.templates.find_by_ids(job.user_id, &job.template_ids).await?;
        // Selection order within the job mirrors the matcher's ranking.
        templates.sort_by(|a, b| {
            b.used_count
                .cmp(&a.used_count)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(templates)
    }

    /// Sources this job scans: the union of its templates' `source_ids`,
    /// or every active source of the user when the templates don't pin any.
    async fn job_sources(
        &self,
        job: &AutomationJob,
        templates: &[RecordingTemplate],
    ) -> Result<Vec<mediaflow_domain::InputSource>, FlowError> {
        let mut ids: Vec<i64> = templates
            .iter()
            .filter_map(|t| t.matching_rules.as_ref())
            .flat_map(|r| r.source_ids.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            let all = self.app.sources.list_for_user(job.user_id).await?;
            return Ok(all.into_iter().filter(|s| s.is_active).collect());
        }
        let sources = self.app.sources.list_by_ids(job.user_id, &ids).await?;
        Ok(sources.into_iter().filter(|s| s.is_active).collect())
    }
}
