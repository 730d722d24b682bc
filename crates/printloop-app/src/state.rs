// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Status snapshot written after every observable driver change.

use serde::Serialize;

use printloop_core::error::Result;
use printloop_core::types::QueueData;
use printloop_queue::PrintQueue;

use crate::services::app_services::AppDriver;

/// Driver status plus the queue contents, as one JSON line.
#[derive(Debug, Serialize)]
pub struct StateSnapshot {
    pub active: bool,
    pub state: &'static str,
    pub status: String,
    pub retries: u32,
    pub current_path: Option<String>,
    pub queues: Vec<QueueData>,
}

impl StateSnapshot {
    pub fn capture(driver: &AppDriver, queue: &PrintQueue) -> Result<Self> {
        Ok(Self {
            active: driver.is_active(),
            state: driver.state().as_str(),
            status: driver.status().to_string(),
            retries: driver.retries(),
            current_path: driver.current_path(),
            queues: queue.snapshot()?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
