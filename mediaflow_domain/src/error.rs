// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error taxonomy for the media automation domain.
//! Failures are categorized so that callers can handle them systematically:
//! the service facade maps categories onto caller-visible results, while the
//! stage executor uses them to decide between retry, skip, and fail.
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! - **Validation**: caller input violated a schema or invariant; state is
//!   never mutated
//! - **NotFound**: entity missing, or scoped to a different user
//! - **Conflict**: uniqueness violation (duplicate name, duplicate source key)
//! - **QuotaDenied**: a quota check failed
//!
//! ### External Collaborator Errors
//! - **RetryableIo**: transient failure against an external collaborator
//!   (network, 5xx, timeout); the stage executor retries with backoff
//! - **FatalExternal**: permanent failure (non-auth 4xx, invalid media,
//!   revoked credential); the stage fails without retry
//!
//! ### Infrastructure Errors
//! - **Database**: persistence operation failures
//! - **Serialization**: JSON config encode/decode failures
//! - **IoError**: file system failures
//! - **TimeoutError**: operation deadline expired (converts to retryable at
//!   the stage boundary)
//!
//! ### System Errors
//! - **Cancelled**: shutdown or user-initiated cancellation
//! - **InvariantViolation**: an internal consistency check failed; the worker
//!   crashes and the entity stays in its last durable state
//! - **InternalError**: unexpected failures with no better category
//!
//! ## Recovery
//!
//! `RetryableIo`, `IoError`, and `TimeoutError` indicate conditions worth
//! retrying. Everything else either propagates to the caller or fails the
//! unit of work permanently.

use thiserror::Error;

/// Domain-specific errors for the media automation platform.
///
/// Each variant carries a descriptive message. Variants are grouped by how
/// they must be handled rather than by where they originate, which keeps the
/// retry/skip/fail decision in the stage executor a pure match on the error.
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Quota denied: {0}")]
    QuotaDenied(String),

    #[error("Retryable I/O error: {0}")]
    RetryableIo(String),

    #[error("Fatal external error: {0}")]
    FatalExternal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FlowError {
    /// Creates a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates a new quota-denied error
    pub fn quota_denied(msg: impl Into<String>) -> Self {
        Self::QuotaDenied(msg.into())
    }

    /// Creates a new retryable I/O error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::RetryableIo(msg.into())
    }

    /// Creates a new fatal external error
    pub fn fatal_external(msg: impl Into<String>) -> Self {
        Self::FatalExternal(msg.into())
    }

    /// Creates a new database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new invariant-violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Checks if the error indicates a condition worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowError::RetryableIo(_) | FlowError::IoError(_) | FlowError::TimeoutError(_)
        )
    }

    /// Checks if the error should propagate to the caller without mutation
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            FlowError::Validation(_) | FlowError::NotFound(_) | FlowError::Conflict(_) | FlowError::QuotaDenied(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            FlowError::Validation(_) => "validation",
            FlowError::NotFound(_) => "not_found",
            FlowError::Conflict(_) => "conflict",
            FlowError::QuotaDenied(_) => "quota_denied",
            FlowError::RetryableIo(_) => "retryable_io",
            FlowError::FatalExternal(_) => "fatal_external",
            FlowError::Database(_) => "database",
            FlowError::Serialization(_) => "serialization",
            FlowError::IoError(_) => "io",
            FlowError::TimeoutError(_) => "timeout",
            FlowError::Cancelled(_) => "cancellation",
            FlowError::InvariantViolation(_) => "invariant",
            FlowError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for FlowError {
    fn from(err: std::io::Error) -> Self {
        FlowError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Serialization(err.to_string())
    }
}

impl From<regex::Error> for FlowError {
    fn from(err: regex::Error) -> Self {
        FlowError::Validation(format!("invalid pattern: {}", err))
    }
}
