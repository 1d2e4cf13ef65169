// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Mediaflow Bootstrap
//!
//! Entry-point concerns kept out of the application crate: logging
//! initialization, graceful shutdown with cancellation tokens, signal
//! wiring, and exit codes. The application crate builds its services, hands
//! long-running loops a token from the [`shutdown::ShutdownCoordinator`],
//! and maps its final result through [`exit_code::ExitCode`].

pub mod exit_code;
pub mod logger;
pub mod shutdown;

pub use exit_code::ExitCode;
pub use logger::{init as init_logging, LogFormat};
pub use shutdown::{spawn_signal_listener, CancellationToken, ShutdownCoordinator};
