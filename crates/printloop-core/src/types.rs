// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Identifiers, tags, and serializable snapshots shared by the queue, driver,
// and daemon crates.

use serde::{Deserialize, Serialize};

use crate::error::PrintloopError;
use crate::model::Job;

/// Name of the queue created on first start and used for local jobs.
pub const DEFAULT_QUEUE: &str = "local";

/// Name of the queue that holds finished jobs. Never scheduled.
pub const ARCHIVE_QUEUE: &str = "archive";

/// Row identifier of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub i64);

/// Row identifier of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetId(pub i64);

/// Row identifier of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub i64);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(JobId, SetId, RunId);

/// Outcome recorded when a run is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunResult {
    Success,
    Failure,
}

impl RunResult {
    /// Keyword stored in the `runs.result` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::str::FromStr for RunResult {
    type Err = PrintloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(PrintloopError::Database(format!("unknown run result: {other}"))),
        }
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering policy of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Jobs and sets printed in rank order.
    InOrder,
    /// Prefer the job needing the fewest manual changes. Not schedulable yet.
    LeastManual,
}

impl Strategy {
    /// Tag stored in the `queues.strategy` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InOrder => "IN_ORDER",
            Self::LeastManual => "LEAST_MANUAL",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = PrintloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older databases used "LINEAR" for in-order queues.
        match s.to_ascii_uppercase().as_str() {
            "IN_ORDER" | "LINEAR" => Ok(Self::InOrder),
            "LEAST_MANUAL" => Ok(Self::LeastManual),
            other => Err(PrintloopError::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// Serializable view of one queue and its jobs, for status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueData {
    pub name: String,
    pub strategy: Strategy,
    pub rank: f64,
    pub addr: Option<String>,
    pub jobs: Vec<Job>,
    /// Set currently selected for printing, if it belongs to this queue.
    pub active_set: Option<SetId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_is_an_alias_for_in_order() {
        assert_eq!("LINEAR".parse::<Strategy>().unwrap(), Strategy::InOrder);
        assert_eq!("in_order".parse::<Strategy>().unwrap(), Strategy::InOrder);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = "RANDOM".parse::<Strategy>().unwrap_err();
        assert!(matches!(err, PrintloopError::UnsupportedStrategy(_)));
    }

    #[test]
    fn run_result_keywords() {
        assert_eq!(RunResult::Success.as_str(), "success");
        assert_eq!("failure".parse::<RunResult>().unwrap(), RunResult::Failure);
        assert!("maybe".parse::<RunResult>().is_err());
    }
}
