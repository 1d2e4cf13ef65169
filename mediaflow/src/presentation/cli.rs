// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-tenant media automation platform.
#[derive(Parser, Debug)]
#[command(name = "mediaflow", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scheduler and janitor until interrupted.
    Serve,
    /// Create the database (if missing) and apply pending migrations.
    Migrate,
    /// List a user's automation jobs.
    ListJobs {
        /// Owning user id (26-char ULID).
        #[arg(long)]
        user: String,
    },
    /// Trigger one automation job immediately.
    TriggerJob {
        /// Owning user id (26-char ULID).
        #[arg(long)]
        user: String,
        /// Job id.
        #[arg(long)]
        job: i64,
        /// Report what would happen without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show a user's quota status.
    Quota {
        /// Owning user id (26-char ULID).
        #[arg(long)]
        user: String,
    },
}
