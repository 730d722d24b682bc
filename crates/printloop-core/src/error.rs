// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for printloop.

use thiserror::Error;

/// Top-level error type for all printloop operations.
#[derive(Debug, Error)]
pub enum PrintloopError {
    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("storage schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Accounting --
    #[error("count must be greater than zero (got {0})")]
    InvalidCount(i64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("queue already exists: {0}")]
    DuplicateQueue(String),

    #[error("unsupported queue strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("queue state lock poisoned")]
    LockPoisoned,

    // -- Event feed --
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    // -- Import --
    #[error("invalid import: {0}")]
    InvalidImport(String),

    // -- Configuration --
    #[error("configuration error: {0}")]
    Config(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintloopError>;
