// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus metrics for pipeline observability: stage executions by type
//! and outcome, quota denials, scheduler activity, and the global in-flight
//! task gauge. Cheap to clone; every handle shares one registry.

use std::sync::Arc;

use mediaflow_domain::FlowError;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "mediaflow";

/// Prometheus metrics handle.
#[derive(Clone)]
pub struct FlowMetrics {
    registry: Arc<Registry>,

    stages_executed_total: IntCounterVec,
    stage_duration_seconds: Histogram,
    quota_denials_total: IntCounter,
    recordings_discovered_total: IntCounter,
    recordings_ready_total: IntCounter,
    recordings_failed_total: IntCounter,
    jobs_triggered_total: IntCounter,
    active_stage_tasks: IntGauge,
}

impl FlowMetrics {
    pub fn new() -> Result<Self, FlowError> {
        let registry = Registry::new();

        let stages_executed_total = IntCounterVec::new(
            Opts::new("stages_executed_total", "Stage executions by stage type and outcome").namespace(NAMESPACE),
            &["stage", "outcome"],
        )
        .map_err(metrics_err)?;

        let stage_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("stage_duration_seconds", "Wall-clock duration of stage attempts")
                .namespace(NAMESPACE)
                .buckets(vec![0.1, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0]),
        )
        .map_err(metrics_err)?;

        let quota_denials_total =
            IntCounter::with_opts(Opts::new("quota_denials_total", "Admissions denied by the quota ledger").namespace(NAMESPACE))
                .map_err(metrics_err)?;

        let recordings_discovered_total = IntCounter::with_opts(
            Opts::new("recordings_discovered_total", "Recordings created by source discovery").namespace(NAMESPACE),
        )
        .map_err(metrics_err)?;

        let recordings_ready_total = IntCounter::with_opts(
            Opts::new("recordings_ready_total", "Recordings that reached READY").namespace(NAMESPACE),
        )
        .map_err(metrics_err)?;

        let recordings_failed_total = IntCounter::with_opts(
            Opts::new("recordings_failed_total", "Recordings that reached FAILED").namespace(NAMESPACE),
        )
        .map_err(metrics_err)?;

        let jobs_triggered_total = IntCounter::with_opts(
            Opts::new("jobs_triggered_total", "Automation job runs triggered by the scheduler").namespace(NAMESPACE),
        )
        .map_err(metrics_err)?;

        let active_stage_tasks = IntGauge::with_opts(
            Opts::new("active_stage_tasks", "Stage attempts currently in flight").namespace(NAMESPACE),
        )
        .map_err(metrics_err)?;

        registry.register(Box::new(stages_executed_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(stage_duration_seconds.clone())).map_err(metrics_err)?;
        registry.register(Box::new(quota_denials_total.clone())).map_err(metrics_err)?;
        registry
            .register(Box::new(recordings_discovered_total.clone()))
            .map_err(metrics_err)?;
        registry.register(Box::new(recordings_ready_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(recordings_failed_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(jobs_triggered_total.clone())).map_err(metrics_err)?;
        registry.register(Box::new(active_stage_tasks.clone())).map_err(metrics_err)?;

        Ok(Self {
            registry: Arc::new(registry),
            stages_executed_total,
            stage_duration_seconds,
            quota_denials_total,
            recordings_discovered_total,
            recordings_ready_total,
            recordings_failed_total,
            jobs_triggered_total,
            active_stage_tasks,
        })
    }

    pub fn record_stage(&self, stage: &str, outcome: &str, duration_seconds: f64) {
        self.stages_executed_total.with_label_values(&[stage, outcome]).inc();
        self.stage_duration_seconds.observe(duration_seconds);
    }

    pub fn record_quota_denial(&self) {
        self.quota_denials_total.inc();
    }

    pub fn record_discovered(&self, count: u64) {
        self.recordings_discovered_total.inc_by(count);
    }

    pub fn record_ready(&self) {
        self.recordings_ready_total.inc();
    }

    pub fn record_failed(&self) {
        self.recordings_failed_total.inc();
    }

    pub fn record_job_triggered(&self) {
        self.jobs_triggered_total.inc();
    }

    pub fn stage_task_started(&self) {
        self.active_stage_tasks.inc();
    }

    pub fn stage_task_finished(&self) {
        self.active_stage_tasks.dec();
    }

    /// Text exposition for the metrics endpoint / debug dump.
    pub fn gather(&self) -> Result<String, FlowError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_err)?;
        String::from_utf8(buffer).map_err(|e| FlowError::internal(format!("metrics encoding: {}", e)))
    }
}

fn metrics_err(e: impl std::fmt::Display) -> FlowError {
    FlowError::internal(format!("metrics error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        let metrics = FlowMetrics::new().unwrap();
        metrics.record_stage("DOWNLOAD", "completed", 12.5);
        metrics.record_quota_denial();
        metrics.stage_task_started();

        let text = metrics.gather().unwrap();
        assert!(text.contains("mediaflow_stages_executed_total"));
        assert!(text.contains("mediaflow_quota_denials_total 1"));
        assert!(text.contains("mediaflow_active_stage_tasks 1"));

        metrics.stage_task_finished();
        let text = metrics.gather().unwrap();
        assert!(text.contains("mediaflow_active_stage_tasks 0"));
    }

    #[test]
    fn test_clones_share_registry() {
        let metrics = FlowMetrics::new().unwrap();
        let clone = metrics.clone();
        clone.record_job_triggered();
        assert!(metrics.gather().unwrap().contains("mediaflow_jobs_triggered_total 1"));
    }
}
