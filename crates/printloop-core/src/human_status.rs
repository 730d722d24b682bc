// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing messages for errors that reach the queue status line.
//
// The driver never raises errors to its caller; anything that goes wrong is
// shown as status text instead, so every error needs a plain-English form.

use crate::error::PrintloopError;

/// How the operator should react to a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The driver will try again on the next tick.
    Transient,
    /// Someone has to fix something before the queue can continue.
    ActionRequired,
    /// The installation itself is inconsistent; printloop cannot start.
    Fatal,
}

/// A human-readable error with a suggestion.
#[derive(Debug, Clone)]
pub struct HumanStatus {
    /// Short summary, suitable for the one-line queue status.
    pub message: String,
    /// What the operator should try.
    pub suggestion: String,
    pub severity: Severity,
}

impl HumanStatus {
    /// Single line combining message and suggestion.
    pub fn line(&self) -> String {
        format!("{} {}", self.message, self.suggestion)
    }
}

/// Convert a `PrintloopError` into a `HumanStatus`.
pub fn humanize(err: &PrintloopError) -> HumanStatus {
    match err {
        PrintloopError::Database(detail) => HumanStatus {
            message: "The print queue database had a problem.".into(),
            suggestion: format!("Retrying on the next update. ({detail})"),
            severity: Severity::Transient,
        },

        PrintloopError::LockPoisoned => HumanStatus {
            message: "The print queue is in an inconsistent state.".into(),
            suggestion: "Restart printloop.".into(),
            severity: Severity::Fatal,
        },

        PrintloopError::SchemaMismatch { expected, found } => HumanStatus {
            message: "The queue database was written by a different version.".into(),
            suggestion: format!(
                "Back up and move the database aside, or install a matching version \
                 (expected schema {expected}, found {found})."
            ),
            severity: Severity::Fatal,
        },

        PrintloopError::Config(detail) => HumanStatus {
            message: "The settings file is invalid.".into(),
            suggestion: format!("Fix config.json and restart. ({detail})"),
            severity: Severity::Fatal,
        },

        PrintloopError::Io(io) => HumanStatus {
            message: "A file could not be read or written.".into(),
            suggestion: format!("Check permissions on the data directory. ({io})"),
            severity: Severity::ActionRequired,
        },

        PrintloopError::Serialization(detail) => HumanStatus {
            message: "Stored data could not be decoded.".into(),
            suggestion: format!("Check the job definition. ({detail})"),
            severity: Severity::ActionRequired,
        },

        PrintloopError::InvalidCount(_) => HumanStatus {
            message: "A job or set has an invalid count.".into(),
            suggestion: "Counts must be at least 1; edit the job.".into(),
            severity: Severity::ActionRequired,
        },

        PrintloopError::NotFound(what) => HumanStatus {
            message: "A queued item disappeared.".into(),
            suggestion: format!("It may have been removed while printing ({what})."),
            severity: Severity::Transient,
        },

        PrintloopError::DuplicateQueue(name) => HumanStatus {
            message: "A queue with that name already exists.".into(),
            suggestion: format!("Pick another name than \"{name}\"."),
            severity: Severity::ActionRequired,
        },

        PrintloopError::UnsupportedStrategy(name) => HumanStatus {
            message: "This queue ordering is not supported yet.".into(),
            suggestion: format!("Switch the queue to in-order printing (was {name})."),
            severity: Severity::ActionRequired,
        },

        PrintloopError::InvalidEvent(line) => HumanStatus {
            message: "An event from the printer host was not understood.".into(),
            suggestion: format!("It was ignored ({line})."),
            severity: Severity::Transient,
        },

        PrintloopError::InvalidImport(detail) => HumanStatus {
            message: "The job file could not be imported.".into(),
            suggestion: format!("Nothing was added; fix the file and import it again ({detail})."),
            severity: Severity::ActionRequired,
        },
    }
}
