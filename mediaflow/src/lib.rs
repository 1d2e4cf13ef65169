// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Mediaflow
//!
//! Multi-tenant media automation platform. For each tenant the system
//! discovers new recordings on third-party sources, runs each one through a
//! multi-stage processing pipeline (download → trim → transcribe → topics →
//! subtitles → upload), and does so under per-tenant quotas with templated
//! configuration, scheduled automation jobs, two-level deletion, and
//! crash-safe retries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Presentation (CLI)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Application (service API, orchestrator, discovery,         │
//! │  matcher, quota ledger, automation)                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Domain (entities, value objects, collaborator ports)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Infrastructure (SQLite repositories, storage paths, stage  │
//! │  actions, executor, scheduler, janitor, adapters, metrics)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows discovery → store → orchestrator → stage executor → store →
//! targets. Control flows scheduler → orchestrator → executor, with the
//! quota ledger consulted by both.
//!
//! ## Core Concepts
//!
//! ### Recording
//! The central entity: one media item tracked from discovery to delivery.
//! Its aggregate status is derived from the per-stage rows, never written
//! free-hand.
//!
//! ### Stage
//! One named pipeline step with its own row, retry budget, timing log, and
//! quota admission. Stage-row uniqueness is what serializes workers.
//!
//! ### Template and automation job
//! Templates turn a discovered recording into a concrete processing plan
//! by rule matching and config merging; automation jobs apply templates on
//! a durable cron schedule under per-tenant quota.

pub mod application;
pub mod context;
pub mod infrastructure;
pub mod presentation;

pub use context::AppContext;
