// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printloop — Core types, the work-accounting model, and error definitions
// shared across all crates.

pub mod config;
pub mod error;
pub mod human_status;
pub mod model;
pub mod types;

pub use config::AppConfig;
pub use error::PrintloopError;
pub use model::{Job, PrintSet, Queue, Run};
pub use types::*;
