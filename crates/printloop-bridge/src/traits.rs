// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Side effects the driver triggers on the printer.

use printloop_core::model::PrintSet;

/// Printer-side actions. Each call is fire-and-forget; the driver learns the
/// outcome from later status events.
pub trait ScriptRunner {
    /// Begin printing the set's file. Returns `false` if the print could not
    /// be started, in which case the driver stays ready to retry.
    fn start_print(&mut self, set: &PrintSet) -> bool;

    /// Abort the print in progress.
    fn cancel_print(&mut self);

    /// Run the bed-clearing script.
    fn clear_bed(&mut self);

    /// Run the end-of-queue script.
    fn run_finish_script(&mut self);
}

impl<R: ScriptRunner + ?Sized> ScriptRunner for Box<R> {
    fn start_print(&mut self, set: &PrintSet) -> bool {
        (**self).start_print(set)
    }

    fn cancel_print(&mut self) {
        (**self).cancel_print();
    }

    fn clear_bed(&mut self) {
        (**self).clear_bed();
    }

    fn run_finish_script(&mut self) {
        (**self).run_finish_script();
    }
}
