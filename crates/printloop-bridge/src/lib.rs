// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printloop — bridge between the driver and the printer's script host.
//
// The driver never talks to the printer directly. It calls a `ScriptRunner`
// to start a file, cancel, clear the bed, or run the finishing script, and
// the host application supplies the implementation.

pub mod stub;
pub mod traits;

pub use stub::StubRunner;
pub use traits::ScriptRunner;
