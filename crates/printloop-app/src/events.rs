// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line-oriented event feed from the printer host.
//
// One event per line: `<action> <printer> [path|-] [materials]`, where
// materials are comma-separated spool keys per tool (empty entry = none).
// Lines starting with an admin keyword (`import`, `add-set`, ...) edit the
// queue instead. Blank lines and lines starting with `#` are ignored.

use printloop_core::PrintSet;
use printloop_core::error::{PrintloopError, Result};
use printloop_driver::{Action, PrinterStatus};

use crate::admin::AdminCommand;

/// One parsed feed line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Event(Event),
    Admin(AdminCommand),
}

/// One parsed event line.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub action: Action,
    pub printer: PrinterStatus,
    pub path: Option<String>,
    pub materials: Vec<Option<String>>,
}

/// Parse a feed line. `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    if AdminCommand::is_keyword(words[0]) {
        return AdminCommand::parse(&words).map(|cmd| Some(Command::Admin(cmd)));
    }
    parse_event(line).map(|ev| Some(Command::Event(ev)))
}

fn parse_event(line: &str) -> Result<Event> {
    let mut words = line.split_whitespace();
    let action: Action = words
        .next()
        .ok_or_else(|| PrintloopError::InvalidEvent(line.to_string()))?
        .parse()?;
    let printer: PrinterStatus = words
        .next()
        .ok_or_else(|| PrintloopError::InvalidEvent(format!("missing printer status: {line}")))?
        .parse()?;
    let path = words.next().filter(|p| *p != "-").map(str::to_string);
    let materials = words.next().map(PrintSet::parse_material_keys).unwrap_or_default();

    if words.next().is_some() {
        return Err(PrintloopError::InvalidEvent(format!("trailing words: {line}")));
    }

    Ok(Event {
        action,
        printer,
        path,
        materials,
    })
}
