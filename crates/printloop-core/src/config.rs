// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PrintloopError, Result};

/// Name of the settings file inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Persistent daemon settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Treat a pause early in a print as a failed print and cancel it.
    pub retry_on_pause: bool,
    /// Attempts per set before the queue gives up and goes inactive.
    pub max_retries: u32,
    /// Pauses later than this (after the run started) wait for the user.
    pub retry_threshold_seconds: u64,
    /// Period of the TICK action fed to the driver.
    pub tick_interval_seconds: u64,
    /// Forward loaded spool materials to the driver (enables the material gate).
    pub material_selection: bool,
    /// SQLite file holding queues, jobs, sets, and runs.
    pub database_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retry_on_pause: false,
            max_retries: 3,
            retry_threshold_seconds: 60 * 60,
            tick_interval_seconds: 5,
            material_selection: false,
            database_file: "queues.sqlite3".into(),
        }
    }
}

impl AppConfig {
    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(PrintloopError::Config("tick_interval_seconds must be > 0".into()));
        }
        if self.database_file.trim().is_empty() {
            return Err(PrintloopError::Config("database_file must not be empty".into()));
        }
        Ok(())
    }

    /// Load `config.json` from `data_dir`. Returns `None` if the file is
    /// missing or unreadable, so callers fall back to defaults.
    pub fn load(data_dir: &Path) -> Option<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let data = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// Write the settings to `config.json` in `data_dir`.
    pub fn persist(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }
}
