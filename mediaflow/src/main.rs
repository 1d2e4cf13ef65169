// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Binary entry point: configuration, wiring, and the subcommands.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use mediaflow_bootstrap::{init_logging, spawn_signal_listener, LogFormat, ShutdownCoordinator};
use mediaflow_domain::UserId;
use tracing::info;

use mediaflow::application::services::{
    AutomationService, PipelineOrchestrator, QuotaLedger, SourceDiscovery, TemplateMatcher,
};
use mediaflow::application::{ServiceApi, TriggerResult};
use mediaflow::context::AppContext;
use mediaflow::infrastructure::adapters::{LocalDirSource, LocalDirTarget};
use mediaflow::infrastructure::config::AppConfig;
use mediaflow::infrastructure::metrics::FlowMetrics;
use mediaflow::infrastructure::repositories::schema;
use mediaflow::infrastructure::runtime::{AutomationScheduler, Janitor, StageExecutor};
use mediaflow::presentation::{Cli, Command};

/// Everything the subcommands need, wired once.
struct Wired {
    api: ServiceApi,
    scheduler: AutomationScheduler,
    janitor: Janitor,
}

async fn wire(config: AppConfig) -> anyhow::Result<Wired> {
    let pool = schema::initialize_database(config.database_url())
        .await
        .context("database initialization failed")?;
    let metrics = FlowMetrics::new().context("metrics registry")?;

    let app = Arc::new(
        AppContext::new(pool, config, metrics)
            .with_source_adapter(Arc::new(LocalDirSource))
            .with_target_adapter(Arc::new(LocalDirTarget)),
    );

    let ledger = QuotaLedger::new(app.clone());
    let executor = Arc::new(StageExecutor::new(app.clone(), ledger.clone()));
    let orchestrator = Arc::new(PipelineOrchestrator::new(app.clone(), executor));
    let discovery = SourceDiscovery::new(app.clone(), ledger.clone());
    let matcher = TemplateMatcher::new(app.clone());
    let automation = AutomationService::new(app.clone(), ledger.clone(), discovery, matcher, orchestrator);

    Ok(Wired {
        api: ServiceApi::new(app.clone(), ledger.clone(), automation.clone()),
        scheduler: AutomationScheduler::new(app.clone(), automation, ledger),
        janitor: Janitor::new(app),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_logging(&config.logging.level, LogFormat::parse(&config.logging.format));

    match cli.command {
        Command::Migrate => {
            schema::initialize_database(config.database_url())
                .await
                .context("migration failed")?;
            info!("database is up to date");
            Ok(())
        }
        Command::Serve => serve(config).await,
        Command::ListJobs { user } => {
            let wired = wire(config).await?;
            let user_id = UserId::parse(&user)?;
            for job in wired.api.list_jobs(user_id).await? {
                println!(
                    "{:>5}  {:<30} active={} runs={} next_run={}",
                    job.id,
                    job.name,
                    job.is_active,
                    job.run_count,
                    job.next_run_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()),
                );
            }
            Ok(())
        }
        Command::TriggerJob { user, job, dry_run } => {
            let wired = wire(config).await?;
            let user_id = UserId::parse(&user)?;
            let cancel = ShutdownCoordinator::default().token();
            match wired.api.trigger_job(user_id, job, dry_run, &cancel).await? {
                TriggerResult::Ran(report) => {
                    println!(
                        "ran: sources={} discovered={} matched={} processed={}",
                        report.sources_scanned, report.discovered, report.matched, report.processed
                    );
                }
                TriggerResult::DryRan(report) => {
                    println!(
                        "dry run: sources={} new={} matched={} templates={:?}",
                        report.sources_scanned,
                        report.estimated_new_recordings,
                        report.estimated_matched_recordings,
                        report.templates_to_apply
                    );
                }
            }
            Ok(())
        }
        Command::Quota { user } => {
            let wired = wire(config).await?;
            let user_id = UserId::parse(&user)?;
            let status = wired.api.get_quota_status(user_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let wired = wire(config).await?;
    let coordinator = ShutdownCoordinator::default();
    spawn_signal_listener(coordinator.clone());

    info!("mediaflow serving");
    let scheduler_token = coordinator.token();
    let janitor_token = coordinator.token();
    tokio::join!(wired.scheduler.run(scheduler_token), wired.janitor.run(janitor_token));

    coordinator.complete();
    info!("mediaflow stopped");
    Ok(())
}
