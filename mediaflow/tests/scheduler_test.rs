// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Automation scheduling: job validation against the tenant's minimum
//! interval, due-job triggering, next-run monotonicity, and the service
//! facade around jobs and recordings.

mod common;

use common::Harness;
use mediaflow::application::services::{JobDraft, JobUpdate};
use mediaflow::application::TriggerResult;
use mediaflow_domain::services::Clock;
use mediaflow_domain::{
    AutomationFilters, FlowError, MatchingRules, OutputConfig, ProcessingStatus, Schedule, SyncConfig,
};
use serde_json::json;

fn draft(name: &str, schedule: Schedule, template_id: i64) -> JobDraft {
    JobDraft {
        name: name.into(),
        description: None,
        template_ids: vec![template_id],
        schedule,
        sync_config: SyncConfig::default(),
        filters: AutomationFilters::default(),
        processing_config: None,
    }
}

async fn seeded_template(h: &Harness) -> i64 {
    h.create_template(
        MatchingRules {
            keywords: vec!["lecture".into()],
            ..Default::default()
        },
        json!({ "transcription": { "enable": true, "enable_topics": false, "enable_subtitles": false } }),
        None,
    )
    .await
    .id
}

#[tokio::test]
async fn schedule_below_min_interval_is_rejected_without_a_row() {
    let h = Harness::new().await;
    let template_id = seeded_template(&h).await;

    // Plan sets min_automation_interval_hours = 6; every 2 hours violates it.
    let err = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "too-frequent",
                Schedule::Hours {
                    every_n_hours: 2,
                    starting_at: 0,
                },
                template_id,
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)));
    assert_eq!(h.app.jobs.count_for_user(h.user.id).await.unwrap(), 0);

    // The same cadence at the limit is accepted.
    let job = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "at-the-limit",
                Schedule::Hours {
                    every_n_hours: 6,
                    starting_at: 0,
                },
                template_id,
            ),
        )
        .await
        .unwrap();
    assert!(job.next_run_at.is_some());
}

#[tokio::test]
async fn duplicate_job_name_is_a_conflict() {
    let h = Harness::new().await;
    let template_id = seeded_template(&h).await;
    let schedule = Schedule::Hours {
        every_n_hours: 12,
        starting_at: 0,
    };

    h.automation
        .create_job(h.user.id, draft("nightly", schedule.clone(), template_id))
        .await
        .unwrap();
    let err = h
        .automation
        .create_job(h.user.id, draft("nightly", schedule, template_id))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Conflict(_)));
}

#[tokio::test]
async fn draft_templates_cannot_back_a_job() {
    let h = Harness::new().await;
    let now = h.clock.now();
    let mut template = mediaflow_domain::RecordingTemplate {
        id: 0,
        user_id: h.user.id,
        name: "draft".into(),
        description: None,
        matching_rules: None,
        processing_config: None,
        metadata_config: None,
        output_config: None,
        is_draft: true,
        is_active: true,
        used_count: 0,
        last_used_at: None,
        created_at: now,
        updated_at: now,
    };
    template.id = h.app.templates.insert(&template).await.unwrap();

    let err = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "with-draft",
                Schedule::Hours {
                    every_n_hours: 12,
                    starting_at: 0,
                },
                template.id,
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)));
}

#[tokio::test]
async fn tick_triggers_due_jobs_and_next_run_strictly_increases() {
    let h = Harness::new().await;
    let template_id = seeded_template(&h).await;

    let job = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "nightly",
                Schedule::Hours {
                    every_n_hours: 12,
                    starting_at: 0,
                },
                template_id,
            ),
        )
        .await
        .unwrap();
    let first_fire = job.next_run_at.unwrap();

    // Not due yet.
    assert_eq!(h.scheduler.tick(&h.cancel_token()).await.unwrap(), 0);

    // Jump past the fire time; the tick triggers exactly once.
    h.clock.set(first_fire + chrono::Duration::minutes(1));
    assert_eq!(h.scheduler.tick(&h.cancel_token()).await.unwrap(), 1);

    let job = h.app.jobs.find_owned(h.user.id, job.id).await.unwrap().unwrap();
    assert_eq!(job.run_count, 1);
    assert_eq!(job.last_run_at, Some(h.clock.now()));
    let second_fire = job.next_run_at.unwrap();
    assert!(second_fire > first_fire);
    assert!((second_fire - first_fire).num_hours() >= 6);

    // Same tick again: nothing is due anymore.
    assert_eq!(h.scheduler.tick(&h.cancel_token()).await.unwrap(), 0);
}

#[tokio::test]
async fn tightened_min_interval_skips_the_job_at_trigger_time() {
    let h = Harness::new().await;
    let template_id = seeded_template(&h).await;

    let job = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "was-fine",
                Schedule::Hours {
                    every_n_hours: 12,
                    starting_at: 0,
                },
                template_id,
            ),
        )
        .await
        .unwrap();

    // The tenant's minimum interval tightens to 24h after creation.
    let mut subscription = h.app.subscriptions.find_subscription(h.user.id).await.unwrap().unwrap();
    subscription.custom_min_automation_interval_hours = Some(24);
    h.app.subscriptions.upsert_subscription(&subscription).await.unwrap();

    h.clock.set(job.next_run_at.unwrap() + chrono::Duration::minutes(1));
    assert_eq!(h.scheduler.tick(&h.cancel_token()).await.unwrap(), 0);

    let job = h.app.jobs.find_owned(h.user.id, job.id).await.unwrap().unwrap();
    assert_eq!(job.run_count, 0);
    // Rescheduled past the violating window instead of running.
    assert!(job.next_run_at.unwrap() > h.clock.now());
}

#[tokio::test]
async fn scheduled_run_discovers_matches_and_processes() {
    let h = Harness::new().await;
    let source = h.create_source().await;
    let preset = h.create_preset().await;
    let template = h
        .create_template(
            MatchingRules {
                keywords: vec!["lecture".into()],
                source_ids: vec![source.id],
                ..Default::default()
            },
            json!({ "transcription": { "enable": true, "enable_topics": false, "enable_subtitles": false } }),
            Some(OutputConfig {
                preset_ids: vec![preset.id],
                auto_upload: true,
                upload_captions: false,
            }),
        )
        .await;

    let job = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "nightly",
                Schedule::Hours {
                    every_n_hours: 12,
                    starting_at: 0,
                },
                template.id,
            ),
        )
        .await
        .unwrap();

    h.source_adapter
        .set_candidates(vec![h.candidate("auto-1", "Weekly lecture on Rust", 3600.0)]);

    h.clock.set(job.next_run_at.unwrap() + chrono::Duration::minutes(1));
    assert_eq!(h.scheduler.tick(&h.cancel_token()).await.unwrap(), 1);

    let recordings = h.app.recordings.list_for_user(h.user.id).await.unwrap();
    assert_eq!(recordings.len(), 1);
    assert_eq!(recordings[0].status, ProcessingStatus::Ready);
    assert_eq!(recordings[0].template_id, Some(template.id));
    assert_eq!(h.target_adapter.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn dry_run_counts_without_writing() {
    let h = Harness::new().await;
    let source = h.create_source().await;
    let template = h
        .create_template(
            MatchingRules {
                keywords: vec!["lecture".into()],
                source_ids: vec![source.id],
                ..Default::default()
            },
            json!({ "transcription": { "enable": true } }),
            None,
        )
        .await;
    let job = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "preview",
                Schedule::Hours {
                    every_n_hours: 12,
                    starting_at: 0,
                },
                template.id,
            ),
        )
        .await
        .unwrap();

    h.source_adapter.set_candidates(vec![
        h.candidate("d1", "Friday lecture", 3600.0),
        h.candidate("d2", "Random clip", 3600.0),
    ]);

    let result = h
        .api
        .trigger_job(h.user.id, job.id, true, &h.cancel_token())
        .await
        .unwrap();
    let TriggerResult::DryRan(report) = result else {
        panic!("expected a dry run");
    };
    assert_eq!(report.sources_scanned, 1);
    assert_eq!(report.estimated_new_recordings, 2);
    assert_eq!(report.estimated_matched_recordings, 2); // source_ids rule matches both
    assert_eq!(report.templates_to_apply, vec![template.id]);

    // Nothing was written.
    assert!(h.app.recordings.list_for_user(h.user.id).await.unwrap().is_empty());
    assert_eq!(h.app.sources.find_owned(h.user.id, source.id).await.unwrap().unwrap().last_sync_at, None);
}

#[tokio::test]
async fn config_patch_merges_and_quota_status_reports() {
    let h = Harness::new().await;
    let source = h.create_source().await;
    h.source_adapter.set_candidates(vec![h.candidate("c1", "Plain recording", 900.0)]);

    let since = h.clock.now() - chrono::Duration::days(1);
    let report = h
        .discovery
        .sync_source(&source, since, h.clock.now(), &Default::default())
        .await
        .unwrap();
    let recording_id = report.created_ids[0];

    let updated = h
        .api
        .update_recording_config(
            h.user.id,
            recording_id,
            json!({ "transcription": { "enable": true, "language": "en" } }),
        )
        .await
        .unwrap();
    assert_eq!(updated.processing_preferences["transcription"]["language"], "en");

    // A second patch merges instead of replacing.
    let updated = h
        .api
        .update_recording_config(h.user.id, recording_id, json!({ "transcription": { "prompt": "names" } }))
        .await
        .unwrap();
    assert_eq!(updated.processing_preferences["transcription"]["language"], "en");
    assert_eq!(updated.processing_preferences["transcription"]["prompt"], "names");

    let status = h.api.get_quota_status(h.user.id).await.unwrap();
    assert_eq!(status.recordings.used, 1);
    assert_eq!(status.recordings.limit, Some(100));
    assert_eq!(status.automation_jobs.used, 0);
    assert_eq!(status.concurrent_tasks.used, 0);
    assert_eq!(status.storage_limit_gb, Some(50));
}

#[tokio::test]
async fn job_update_revalidates_schedule() {
    let h = Harness::new().await;
    let template_id = seeded_template(&h).await;
    let job = h
        .automation
        .create_job(
            h.user.id,
            draft(
                "editable",
                Schedule::Hours {
                    every_n_hours: 12,
                    starting_at: 0,
                },
                template_id,
            ),
        )
        .await
        .unwrap();

    let err = h
        .automation
        .update_job(
            h.user.id,
            job.id,
            JobUpdate {
                schedule: Some(Schedule::Hours {
                    every_n_hours: 1,
                    starting_at: 0,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)));

    // The stored job is untouched.
    let stored = h.app.jobs.find_owned(h.user.id, job.id).await.unwrap().unwrap();
    assert_eq!(stored.schedule, job.schedule);
}
