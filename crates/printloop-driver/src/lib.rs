// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printloop-driver — the state machine that walks one printer through the
// queue: start, watch, recover, clear the bed, and finish.

pub mod driver;
pub mod elapsed;
pub mod materials;

pub use driver::{Action, Driver, DriverState, PrinterStatus};
