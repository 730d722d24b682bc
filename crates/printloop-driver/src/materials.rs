// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Material gate: a set may require a specific spool in each tool slot.

use std::fmt;

/// First tool slot whose loaded spool differs from what the set requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch<'a> {
    pub tool: usize,
    pub wanted: &'a str,
    /// `None` when nothing is known to be loaded in that slot.
    pub loaded: Option<&'a str>,
}

impl fmt::Display for Mismatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Waiting for spool {} in tool {} (currently: {})",
            self.wanted,
            self.tool,
            self.loaded.unwrap_or("none")
        )
    }
}

/// Compare required materials against the loaded ones, slot by slot.
///
/// Slots without a requirement are skipped. A requirement beyond the end of
/// `loaded` is a mismatch against an unknown spool.
pub fn first_mismatch<'a>(
    required: &'a [Option<String>],
    loaded: &'a [Option<String>],
) -> Option<Mismatch<'a>> {
    required.iter().enumerate().find_map(|(tool, want)| {
        let want = want.as_deref()?;
        let have = loaded.get(tool).and_then(|m| m.as_deref());
        (have != Some(want)).then_some(Mismatch {
            tool,
            wanted: want,
            loaded: have,
        })
    })
}
