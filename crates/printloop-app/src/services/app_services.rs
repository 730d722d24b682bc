// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — loads settings, opens the queue database, and
// builds a driver wired to it.
//
// The queue is held in an `Arc` so the driver and the snapshot writer can
// both reach it; `PrintQueue` serializes access internally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use printloop_bridge::StubRunner;
use printloop_core::AppConfig;
use printloop_core::config::CONFIG_FILE;
use printloop_core::error::Result;
use printloop_driver::{Action, Driver, PrinterStatus};
use printloop_queue::{PrintQueue, Storage};
use tracing::{info, warn};

use super::data_dir;
use crate::admin;

/// Driver type run by the daemon.
pub type AppDriver = Driver<Arc<PrintQueue>, StubRunner>;

/// Shared application services.
#[derive(Clone)]
pub struct AppServices {
    queue: Arc<PrintQueue>,
    data_dir: Option<PathBuf>,
    config: AppConfig,
}

impl AppServices {
    /// Initialise all services. Call once at startup.
    pub fn init() -> Result<Self> {
        Self::open(data_dir::data_dir())
    }

    /// Initialise services rooted at `dir`.
    ///
    /// Settings come from `config.json` (written with defaults if missing);
    /// the queue database is opened or created next to it. A pending
    /// `import.json` is imported once.
    pub fn open(dir: PathBuf) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");
        let config = load_config(&dir);
        config.validate()?;

        let storage = Storage::open(dir.join(&config.database_file))?;
        let queue = PrintQueue::new(storage)?;
        if let Err(e) = admin::import_pending(&queue, &dir) {
            warn!(error = %e, "startup import failed; file left in place");
        }

        info!("app services initialised");
        Ok(Self {
            queue: Arc::new(queue),
            data_dir: Some(dir),
            config,
        })
    }

    /// In-memory services for when the data directory is unusable. Nothing
    /// survives a restart.
    pub fn fallback() -> Result<Self> {
        let queue = PrintQueue::new(Storage::open_in_memory()?)?;
        Ok(Self {
            queue: Arc::new(queue),
            data_dir: None,
            config: AppConfig::default(),
        })
    }

    pub fn queue(&self) -> &Arc<PrintQueue> {
        &self.queue
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Build a driver over the queue, configured from settings and settled
    /// into the inactive state.
    pub fn driver(&self) -> AppDriver {
        let mut driver = Driver::new(Arc::clone(&self.queue), StubRunner::new());
        driver.set_retry_on_pause(
            self.config.retry_on_pause,
            self.config.max_retries,
            self.config.retry_threshold_seconds,
        );
        driver.action(Action::Deactivate, PrinterStatus::Idle, None, &[]);
        driver
    }
}

/// Load persisted config, or write and return the defaults.
fn load_config(dir: &Path) -> AppConfig {
    if let Some(config) = AppConfig::load(dir) {
        return config;
    }
    let config = AppConfig::default();
    if !dir.join(CONFIG_FILE).exists() {
        if let Err(e) = config.persist(dir) {
            warn!(error = %e, "could not write default config");
        }
    } else {
        warn!("config.json unreadable; using defaults");
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use printloop_core::types::DEFAULT_QUEUE;
    use printloop_driver::DriverState;

    #[test]
    fn open_creates_config_and_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = AppServices::open(dir.path().to_path_buf()).expect("open");
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert!(dir.path().join("queues.sqlite3").exists());
        assert_eq!(svc.config(), &AppConfig::default());
        assert_eq!(svc.data_dir(), Some(dir.path()));
    }

    #[test]
    fn settings_reach_the_driver() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            max_retries: 1,
            database_file: "custom.sqlite3".into(),
            ..Default::default()
        };
        config.persist(dir.path()).expect("persist");

        let svc = AppServices::open(dir.path().to_path_buf()).expect("open");
        assert!(dir.path().join("custom.sqlite3").exists());
        svc.queue()
            .add_job(
                DEFAULT_QUEUE,
                "j",
                1,
                vec![printloop_core::PrintSet::new("a.gcode", 1).expect("set")],
            )
            .expect("add");

        let mut driver = svc.driver();
        assert_eq!(driver.state(), DriverState::Inactive);
        driver.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        driver.action(Action::Failure, PrinterStatus::Idle, None, &[]);
        driver.action(Action::Tick, PrinterStatus::Idle, None, &[]);
        // max_retries = 1 gives up on the first failure.
        assert_eq!(driver.state(), DriverState::Inactive);
        assert_eq!(driver.runner().prints_started, 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            tick_interval_seconds: 0,
            ..Default::default()
        };
        config.persist(dir.path()).expect("persist");
        assert!(AppServices::open(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn pending_import_is_loaded_at_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = r#"{ "jobs": [{ "name": "brackets", "sets": [{ "path": "b.gcode" }] }] }"#;
        std::fs::write(dir.path().join(admin::IMPORT_FILE), manifest).expect("write");

        let svc = AppServices::open(dir.path().to_path_buf()).expect("open");
        assert!(!dir.path().join(admin::IMPORT_FILE).exists());

        let mut driver = svc.driver();
        driver.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        assert_eq!(driver.state(), DriverState::Printing);
        assert_eq!(driver.current_path().as_deref(), Some("b.gcode"));
    }

    #[test]
    fn broken_import_does_not_block_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(admin::IMPORT_FILE), "{ not json").expect("write");

        let svc = AppServices::open(dir.path().to_path_buf()).expect("open");
        assert!(dir.path().join(admin::IMPORT_FILE).exists());
        assert!(svc.queue().snapshot().expect("snapshot").iter().all(|q| q.jobs.is_empty()));
    }

    #[test]
    fn fallback_is_usable() {
        let svc = AppServices::fallback().expect("fallback");
        assert!(svc.data_dir().is_none());
        assert_eq!(svc.queue().queues().expect("queues").len(), 2);
    }
}
