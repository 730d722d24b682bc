// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printloop queue — persistent storage of queues, jobs, sets, and runs, and
// the facade the driver uses to pick work and record attempts.

pub mod facade;
pub mod storage;

pub use facade::{JobUpdate, PrintQueue, WorkQueue};
pub use storage::Storage;
