// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printloop — headless print queue daemon
//
// Entry point. Initialises logging and backend services, then feeds the
// driver from stdin events and a periodic tick. Admin lines on the same feed
// edit the queue. A JSON status snapshot is written to stdout after every
// observable change.

mod admin;
mod events;
mod services;
mod state;

use std::process::ExitCode;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use printloop_core::human_status::{Severity, humanize};
use printloop_driver::{Action, PrinterStatus};

use events::Command;
use services::app_services::{AppDriver, AppServices};
use state::StateSnapshot;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("printloop starting");

    let svc = match AppServices::init() {
        Ok(s) => s,
        Err(e) if humanize(&e).severity == Severity::Fatal => {
            error!(error = %e, "cannot start");
            eprintln!("{}", humanize(&e).line());
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!(error = %e, "persistent storage failed; using in-memory fallback");
            match AppServices::fallback() {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("{}", humanize(&e).line());
                    return ExitCode::FAILURE;
                }
            }
        }
    };
    if let Some(dir) = svc.data_dir() {
        info!(path = %dir.display(), "using data directory");
    }

    run(svc).await;
    info!("printloop stopped");
    ExitCode::SUCCESS
}

/// Drive the queue until stdin closes.
async fn run(svc: AppServices) {
    let mut driver = svc.driver();
    publish(&driver, &svc);

    let period = Duration::from_secs(svc.config().tick_interval_seconds);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let use_materials = svc.config().material_selection;
    let mut printer = PrinterStatus::Idle;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let changed = tokio::select! {
            _ = ticker.tick() => driver.action(Action::Tick, printer, None, &[]),
            line = lines.next_line() => match line {
                Ok(Some(line)) => match events::parse_line(&line) {
                    Ok(Some(Command::Event(ev))) => {
                        printer = ev.printer;
                        let materials: &[Option<String>] =
                            if use_materials { &ev.materials } else { &[] };
                        driver.action(ev.action, ev.printer, ev.path.as_deref(), materials)
                    }
                    Ok(Some(Command::Admin(cmd))) => match cmd.apply(svc.queue()) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(error = %e, "{}", humanize(&e).line());
                            false
                        }
                    },
                    Ok(None) => false,
                    Err(e) => {
                        warn!(error = %e, "{}", humanize(&e).line());
                        false
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "event feed failed");
                    break;
                }
            },
        };
        if changed {
            publish(&driver, &svc);
        }
    }
}

fn publish(driver: &AppDriver, svc: &AppServices) {
    match StateSnapshot::capture(driver, svc.queue()).and_then(|s| s.to_json()) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "could not build status snapshot"),
    }
}
