// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub runner for headless and CI use where no printer is attached.
//
// Every call is logged and reported as successful, so the driver can be
// exercised end to end from a scripted event feed.

use printloop_core::model::PrintSet;

use crate::traits::ScriptRunner;

/// Runner that only logs. Counts calls so callers can report activity.
#[derive(Debug, Default)]
pub struct StubRunner {
    pub prints_started: u32,
    pub cancels: u32,
    pub bed_clears: u32,
    pub finishes: u32,
}

impl StubRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptRunner for StubRunner {
    fn start_print(&mut self, set: &PrintSet) -> bool {
        tracing::warn!(
            path = %set.path,
            sd = set.sd,
            "ScriptRunner::start_print called on stub runner"
        );
        self.prints_started += 1;
        true
    }

    fn cancel_print(&mut self) {
        tracing::warn!("ScriptRunner::cancel_print called on stub runner");
        self.cancels += 1;
    }

    fn clear_bed(&mut self) {
        tracing::warn!("ScriptRunner::clear_bed called on stub runner");
        self.bed_clears += 1;
    }

    fn run_finish_script(&mut self) {
        tracing::warn!("ScriptRunner::run_finish_script called on stub runner");
        self.finishes += 1;
    }
}
