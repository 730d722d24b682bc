// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print queue driver.
//
// The driver is fed (action, printer status) samples by its host on every
// status change and on a timer tick. Each call evaluates the handler for the
// current state, which may pick a next state and trigger at most one script
// on the printer. Nothing here blocks: waiting means returning no transition
// and letting the host call again.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use printloop_bridge::ScriptRunner;
use printloop_core::error::{PrintloopError, Result};
use printloop_core::human_status::humanize;
use printloop_core::types::RunResult;
use printloop_queue::WorkQueue;

use crate::elapsed::time_ago;
use crate::materials::first_mismatch;

/// Event reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The user started managing the queue.
    Activate,
    /// The user stopped managing the queue.
    Deactivate,
    /// A print or script finished successfully.
    Success,
    /// A print or script failed.
    Failure,
    /// A failure detector paused the print.
    Spaghetti,
    /// Periodic poll with no event.
    Tick,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Spaghetti => "spaghetti",
            Self::Tick => "tick",
        }
    }
}

impl FromStr for Action {
    type Err = PrintloopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "activate" => Ok(Self::Activate),
            "deactivate" => Ok(Self::Deactivate),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "spaghetti" => Ok(Self::Spaghetti),
            "tick" => Ok(Self::Tick),
            other => Err(PrintloopError::InvalidEvent(format!("unknown action: {other}"))),
        }
    }
}

/// Printer state as last sampled by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterStatus {
    Idle,
    Paused,
    Busy,
}

impl PrinterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Paused => "paused",
            Self::Busy => "busy",
        }
    }
}

impl FromStr for PrinterStatus {
    type Err = PrintloopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "paused" => Ok(Self::Paused),
            "busy" => Ok(Self::Busy),
            other => Err(PrintloopError::InvalidEvent(format!("unknown printer status: {other}"))),
        }
    }
}

/// Driver states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Unknown,
    Inactive,
    StartPrint,
    Printing,
    Paused,
    SpaghettiRecovery,
    Failure,
    Success,
    StartClearing,
    Clearing,
    StartFinishing,
    Finishing,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Inactive => "inactive",
            Self::StartPrint => "start_print",
            Self::Printing => "printing",
            Self::Paused => "paused",
            Self::SpaghettiRecovery => "spaghetti_recovery",
            Self::Failure => "failure",
            Self::Success => "success",
            Self::StartClearing => "start_clearing",
            Self::Clearing => "clearing",
            Self::StartFinishing => "start_finishing",
            Self::Finishing => "finishing",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const WAITING_FOR_PRINTER: &str = "Waiting for printer to be ready";
const CLEARING_ABORTED: &str = "Error occurred clearing bed - aborting";

/// Handler result: the next state, or `None` to stay.
type Step = Result<Option<DriverState>>;

/// State machine driving one printer through the queue.
pub struct Driver<Q, R> {
    q: Q,
    runner: R,
    state: DriverState,
    status: String,
    retries: u32,
    retry_on_pause: bool,
    max_retries: u32,
    retry_threshold: Duration,
    cur_path: Option<String>,
    cur_materials: Vec<Option<String>>,
    dirty: bool,
}

impl<Q: WorkQueue, R: ScriptRunner> Driver<Q, R> {
    /// New driver in the `Unknown` state. Send `Deactivate` to settle it.
    pub fn new(q: Q, runner: R) -> Self {
        let mut driver = Self {
            q,
            runner,
            state: DriverState::Unknown,
            status: String::new(),
            retries: 0,
            retry_on_pause: false,
            max_retries: 3,
            retry_threshold: Duration::hours(1),
            cur_path: None,
            cur_materials: Vec::new(),
            dirty: false,
        };
        driver.set_status("Initializing");
        driver
    }

    /// Feed one sample. Returns whether anything observable changed since the
    /// previous call.
    ///
    /// `path` and `materials` update the tracked values only when non-empty,
    /// so callers may omit them on ticks.
    pub fn action(
        &mut self,
        action: Action,
        printer: PrinterStatus,
        path: Option<&str>,
        materials: &[Option<String>],
    ) -> bool {
        debug!(
            action = action.as_str(),
            printer = printer.as_str(),
            ?path,
            ?materials,
            "driver action"
        );
        if let Some(p) = path.filter(|p| !p.is_empty()) {
            self.cur_path = Some(p.to_string());
        }
        if !materials.is_empty() {
            self.cur_materials = materials.to_vec();
        }

        match self.step(action, printer) {
            Ok(Some(next)) => {
                info!(from = %self.state, to = %next, "driver transition");
                self.state = next;
                self.dirty = true;
            }
            Ok(None) => {}
            Err(e) => {
                error!(state = %self.state, error = %e, "queue operation failed");
                let line = humanize(&e).line();
                self.set_status(&line);
            }
        }
        std::mem::take(&mut self.dirty)
    }

    fn step(&mut self, action: Action, printer: PrinterStatus) -> Step {
        // Deactivate is accepted from every state.
        if action == Action::Deactivate && self.state != DriverState::Inactive {
            return Ok(Some(DriverState::Inactive));
        }
        match self.state {
            DriverState::Unknown => Ok(None),
            DriverState::Inactive => self.inactive(action, printer),
            DriverState::StartPrint => self.start_print(printer),
            DriverState::Printing => self.printing(action, printer),
            DriverState::Paused => self.paused(action, printer),
            DriverState::SpaghettiRecovery => self.spaghetti_recovery(printer),
            DriverState::Failure => self.failure(printer),
            DriverState::Success => self.success(),
            DriverState::StartClearing => self.start_clearing(action, printer),
            DriverState::Clearing => self.clearing(action, printer),
            DriverState::StartFinishing => self.start_finishing(printer),
            DriverState::Finishing => self.finishing(action, printer),
        }
    }

    fn inactive(&mut self, action: Action, printer: PrinterStatus) -> Step {
        self.retries = 0;
        if action == Action::Activate {
            if printer != PrinterStatus::Idle {
                return Ok(Some(DriverState::Printing));
            }
            return self.enter_start_print(printer);
        }
        if printer == PrinterStatus::Idle {
            self.set_status("Inactive (click Start Managing)");
        } else {
            self.set_status("Inactive (active print continues unmanaged)");
        }
        Ok(None)
    }

    /// Evaluate StartPrint right away so an idle printer starts within the
    /// same call.
    fn enter_start_print(&mut self, printer: PrinterStatus) -> Step {
        Ok(Some(self.start_print(printer)?.unwrap_or(DriverState::StartPrint)))
    }

    fn start_print(&mut self, printer: PrinterStatus) -> Step {
        if printer != PrinterStatus::Idle {
            self.set_status(WAITING_FOR_PRINTER);
            return Ok(None);
        }
        let Some(set) = self.q.get_set_or_acquire()? else {
            self.set_status("No work to do; going inactive");
            return Ok(Some(DriverState::Inactive));
        };

        let mismatch = first_mismatch(&set.materials, &self.cur_materials).map(|m| m.to_string());
        if let Some(wait) = mismatch {
            self.set_status(&wait);
            return Ok(None);
        }

        self.q.begin_run()?;
        if self.runner.start_print(&set) {
            Ok(Some(DriverState::Printing))
        } else {
            warn!(path = %set.path, "printer refused to start; will retry");
            Ok(None)
        }
    }

    fn printing(&mut self, action: Action, printer: PrinterStatus) -> Step {
        match action {
            Action::Failure => return Ok(Some(DriverState::Failure)),
            Action::Spaghetti => return self.spaghetti(),
            Action::Success => {
                // Only account the set if the file that finished is the one we
                // started; anything else was printed outside the queue.
                let ours = self
                    .q
                    .get_set()?
                    .is_some_and(|s| self.cur_path.as_deref() == Some(s.path.as_str()));
                return Ok(Some(if ours {
                    DriverState::Success
                } else {
                    DriverState::StartClearing
                }));
            }
            _ => {}
        }
        match printer {
            PrinterStatus::Busy => {
                if self.q.get_set()?.is_some() {
                    self.set_status("Printing");
                }
                Ok(None)
            }
            PrinterStatus::Paused => Ok(Some(DriverState::Paused)),
            // Idle without an event: assume success.
            PrinterStatus::Idle => Ok(Some(DriverState::Success)),
        }
    }

    fn spaghetti(&mut self) -> Step {
        let Some(run) = self.q.get_run()? else {
            self.set_status("Paused with no run in progress; awaiting user");
            return Ok(Some(DriverState::Paused));
        };
        let elapsed = run.elapsed(Utc::now());
        if self.retry_on_pause && elapsed < self.retry_threshold {
            return Ok(Some(DriverState::SpaghettiRecovery));
        }
        let status = format!(
            "Paused after {} (>{}); awaiting user",
            time_ago(elapsed),
            time_ago(self.retry_threshold)
        );
        self.set_status(&status);
        Ok(Some(DriverState::Paused))
    }

    fn paused(&mut self, action: Action, printer: PrinterStatus) -> Step {
        self.set_status("Queue paused");
        if action == Action::Activate || printer == PrinterStatus::Idle {
            return Ok(Some(DriverState::Inactive));
        }
        if printer == PrinterStatus::Busy {
            return Ok(Some(DriverState::Printing));
        }
        Ok(None)
    }

    fn spaghetti_recovery(&mut self, printer: PrinterStatus) -> Step {
        self.set_status("Cancelling print (spaghetti seen early in print)");
        if printer == PrinterStatus::Paused {
            self.runner.cancel_print();
            return Ok(Some(DriverState::Failure));
        }
        Ok(None)
    }

    fn failure(&mut self, printer: PrinterStatus) -> Step {
        if printer != PrinterStatus::Idle {
            return Ok(None);
        }
        if self.retries + 1 < self.max_retries {
            self.retries += 1;
            info!(retries = self.retries, max_retries = self.max_retries, "retrying failed print");
            return Ok(Some(DriverState::StartClearing));
        }
        warn!(max_retries = self.max_retries, "giving up on set after repeated failures");
        self.q.end_run(RunResult::Failure)?;
        Ok(Some(DriverState::Inactive))
    }

    fn success(&mut self) -> Step {
        // No-op when no run is open, e.g. managing began mid-print.
        self.q.end_run(RunResult::Success)?;
        self.retries = 0;
        if self.q.get_set_or_acquire()?.is_some() {
            Ok(Some(DriverState::StartClearing))
        } else {
            Ok(Some(DriverState::StartFinishing))
        }
    }

    fn start_clearing(&mut self, action: Action, printer: PrinterStatus) -> Step {
        match action {
            Action::Success => return self.enter_start_print(printer),
            Action::Failure => {
                self.set_status(CLEARING_ABORTED);
                return Ok(Some(DriverState::Inactive));
            }
            _ => {}
        }
        if printer != PrinterStatus::Idle {
            self.set_status(WAITING_FOR_PRINTER);
            return Ok(None);
        }
        self.runner.clear_bed();
        Ok(Some(DriverState::Clearing))
    }

    fn clearing(&mut self, action: Action, printer: PrinterStatus) -> Step {
        match action {
            Action::Success => return self.enter_start_print(printer),
            Action::Failure => {
                self.set_status(CLEARING_ABORTED);
                return Ok(Some(DriverState::Inactive));
            }
            _ => {}
        }
        if printer == PrinterStatus::Idle {
            return self.enter_start_print(printer);
        }
        self.set_status("Clearing bed");
        Ok(None)
    }

    fn start_finishing(&mut self, printer: PrinterStatus) -> Step {
        if printer != PrinterStatus::Idle {
            self.set_status(WAITING_FOR_PRINTER);
            return Ok(None);
        }
        self.runner.run_finish_script();
        Ok(Some(DriverState::Finishing))
    }

    fn finishing(&mut self, action: Action, printer: PrinterStatus) -> Step {
        if matches!(action, Action::Success | Action::Failure) || printer == PrinterStatus::Idle {
            return Ok(Some(DriverState::Inactive));
        }
        self.set_status("Finishing up");
        Ok(None)
    }

    fn set_status(&mut self, status: &str) {
        if self.status != status {
            info!(status, "driver status");
            self.status = status.to_string();
            self.dirty = true;
        }
    }

    /// Configure spaghetti recovery. Takes effect on the next evaluation.
    pub fn set_retry_on_pause(
        &mut self,
        enabled: bool,
        max_retries: u32,
        retry_threshold_seconds: u64,
    ) {
        self.retry_on_pause = enabled;
        self.max_retries = max_retries;
        let secs = retry_threshold_seconds.min(i64::MAX as u64 / 1000) as i64;
        self.retry_threshold = Duration::seconds(secs);
        debug!(enabled, max_retries, retry_threshold_seconds, "retry on pause configured");
    }

    /// Path of the selected set, if any.
    pub fn current_path(&self) -> Option<String> {
        match self.q.get_set() {
            Ok(set) => set.map(|s| s.path),
            Err(e) => {
                error!(error = %e, "could not read selected set");
                None
            }
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether the driver is managing the queue.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, DriverState::Inactive | DriverState::Unknown)
    }

    pub fn queue(&self) -> &Q {
        &self.q
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use chrono::{DateTime, Utc};
    use printloop_core::model::{PrintSet, Run};
    use printloop_core::types::{JobId, RunId};

    use super::*;

    /// Queue double: one fixed set, one run slot, and a switch to make every
    /// call fail.
    #[derive(Default)]
    struct FakeQueue {
        set: RefCell<Option<PrintSet>>,
        run: RefCell<Option<Run>>,
        begun: Cell<u32>,
        ended: RefCell<Vec<RunResult>>,
        broken: Cell<bool>,
    }

    impl FakeQueue {
        fn check(&self) -> Result<()> {
            if self.broken.get() {
                return Err(PrintloopError::Database("disk I/O error".into()));
            }
            Ok(())
        }

        fn start_run_at(&self, start: DateTime<Utc>) {
            if let Some(run) = self.run.borrow_mut().as_mut() {
                run.start = start;
            }
        }
    }

    impl WorkQueue for FakeQueue {
        fn get_set_or_acquire(&self) -> Result<Option<PrintSet>> {
            self.check()?;
            Ok(self.set.borrow().clone())
        }

        fn get_set(&self) -> Result<Option<PrintSet>> {
            self.check()?;
            Ok(self.set.borrow().clone())
        }

        fn get_run(&self) -> Result<Option<Run>> {
            self.check()?;
            Ok(self.run.borrow().clone())
        }

        fn begin_run(&self) -> Result<Option<Run>> {
            self.check()?;
            let Some(set) = self.set.borrow().clone() else {
                return Ok(None);
            };
            self.begun.set(self.begun.get() + 1);
            let run = Run {
                id: RunId(i64::from(self.begun.get())),
                queue_name: "local".into(),
                job_name: "job".into(),
                job_id: JobId(1),
                path: set.path,
                start: Utc::now(),
                end: None,
                result: None,
            };
            *self.run.borrow_mut() = Some(run.clone());
            Ok(Some(run))
        }

        fn end_run(&self, result: RunResult) -> Result<()> {
            self.check()?;
            if self.run.borrow_mut().take().is_some() {
                self.ended.borrow_mut().push(result);
            }
            Ok(())
        }
    }

    /// Runner double that records every call.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        refuse_start: bool,
    }

    impl ScriptRunner for Recorder {
        fn start_print(&mut self, set: &PrintSet) -> bool {
            self.calls.push(format!("start:{}", set.path));
            !self.refuse_start
        }

        fn cancel_print(&mut self) {
            self.calls.push("cancel".into());
        }

        fn clear_bed(&mut self) {
            self.calls.push("clear".into());
        }

        fn run_finish_script(&mut self) {
            self.calls.push("finish".into());
        }
    }

    type TestDriver = Driver<FakeQueue, Recorder>;

    fn set_with(path: &str, materials: Vec<Option<String>>) -> PrintSet {
        PrintSet::new(path, 1).expect("set").with_materials(materials)
    }

    fn driver_with(set: Option<PrintSet>) -> TestDriver {
        let q = FakeQueue::default();
        *q.set.borrow_mut() = set;
        let mut d = Driver::new(q, Recorder::default());
        d.set_retry_on_pause(true, 3, 3600);
        d.action(Action::Deactivate, PrinterStatus::Idle, None, &[]);
        d
    }

    fn driver() -> TestDriver {
        driver_with(Some(set_with("a.gcode", vec![])))
    }

    fn tick(d: &mut TestDriver, printer: PrinterStatus) -> bool {
        d.action(Action::Tick, printer, None, &[])
    }

    fn calls(d: &TestDriver) -> Vec<&str> {
        d.runner().calls.iter().map(String::as_str).collect()
    }

    const ALL_STATES: [DriverState; 12] = [
        DriverState::Unknown,
        DriverState::Inactive,
        DriverState::StartPrint,
        DriverState::Printing,
        DriverState::Paused,
        DriverState::SpaghettiRecovery,
        DriverState::Failure,
        DriverState::Success,
        DriverState::StartClearing,
        DriverState::Clearing,
        DriverState::StartFinishing,
        DriverState::Finishing,
    ];

    #[test]
    fn starts_unknown_and_settles_inactive() {
        let mut d = Driver::new(FakeQueue::default(), Recorder::default());
        assert_eq!(d.state(), DriverState::Unknown);
        assert_eq!(d.status(), "Initializing");
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Unknown);
        assert!(d.action(Action::Deactivate, PrinterStatus::Idle, None, &[]));
        assert_eq!(d.state(), DriverState::Inactive);
        assert!(!d.is_active());
    }

    #[test]
    fn deactivate_from_every_state() {
        for state in ALL_STATES {
            for printer in [PrinterStatus::Idle, PrinterStatus::Paused, PrinterStatus::Busy] {
                let mut d = driver();
                d.state = state;
                d.action(Action::Deactivate, printer, None, &[]);
                assert_eq!(d.state(), DriverState::Inactive, "from {state} with {printer:?}");
                assert!(calls(&d).is_empty(), "side effect from {state}");
                assert!(d.queue().ended.borrow().is_empty());
            }
        }
    }

    #[test]
    fn activate_while_idle_starts_printing_in_one_call() {
        let mut d = driver();
        assert!(d.action(Action::Activate, PrinterStatus::Idle, None, &[]));
        assert_eq!(d.state(), DriverState::Printing);
        assert_eq!(d.queue().begun.get(), 1);
        assert_eq!(calls(&d), vec!["start:a.gcode"]);
        assert!(d.is_active());
        assert_eq!(d.current_path().as_deref(), Some("a.gcode"));
    }

    #[test]
    fn activate_while_busy_adopts_the_running_print() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Busy, None, &[]);
        tick(&mut d, PrinterStatus::Busy);
        assert_eq!(d.state(), DriverState::Printing);
        assert_eq!(d.status(), "Printing");
        assert!(calls(&d).is_empty());
    }

    #[test]
    fn events_cause_no_action_while_inactive() {
        let mut d = driver();
        for printer in [PrinterStatus::Idle, PrinterStatus::Busy, PrinterStatus::Paused] {
            for action in [
                Action::Success,
                Action::Failure,
                Action::Tick,
                Action::Deactivate,
                Action::Spaghetti,
            ] {
                d.action(action, printer, None, &[]);
                assert_eq!(d.state(), DriverState::Inactive);
            }
        }
        assert!(calls(&d).is_empty());
        assert_eq!(d.status(), "Inactive (active print continues unmanaged)");
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.status(), "Inactive (click Start Managing)");
    }

    #[test]
    fn status_changes_are_reported_once() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Busy, None, &[]);
        assert!(tick(&mut d, PrinterStatus::Busy));
        assert!(!tick(&mut d, PrinterStatus::Busy));
        assert!(tick(&mut d, PrinterStatus::Paused));
    }

    #[test]
    fn completed_set_then_clear_bed_and_print_again() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        d.action(Action::Success, PrinterStatus::Idle, Some("a.gcode"), &[]);
        assert_eq!(d.state(), DriverState::Success);

        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::StartClearing);
        assert_eq!(*d.queue().ended.borrow(), vec![RunResult::Success]);

        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Clearing);
        d.action(Action::Success, PrinterStatus::Idle, None, &[]);
        assert_eq!(d.state(), DriverState::Printing);
        assert_eq!(calls(&d), vec!["start:a.gcode", "clear", "start:a.gcode"]);
    }

    #[test]
    fn completed_last_set_runs_the_finish_script() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        d.action(Action::Success, PrinterStatus::Idle, Some("a.gcode"), &[]);
        *d.queue().set.borrow_mut() = None;

        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::StartFinishing);
        tick(&mut d, PrinterStatus::Busy);
        assert_eq!(d.state(), DriverState::StartFinishing);
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Finishing);
        tick(&mut d, PrinterStatus::Busy);
        assert_eq!(d.status(), "Finishing up");
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Inactive);
        assert_eq!(calls(&d), vec!["start:a.gcode", "finish"]);
    }

    #[test]
    fn print_outside_the_queue_is_not_accounted() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Busy, None, &[]);
        d.action(Action::Success, PrinterStatus::Idle, Some("other.gcode"), &[]);
        assert_eq!(d.state(), DriverState::StartClearing);
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Clearing);
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Printing);
        assert_eq!(d.queue().begun.get(), 1);
        assert!(d.queue().ended.borrow().is_empty());
    }

    #[test]
    fn idle_without_event_counts_as_success() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Success);
    }

    #[test]
    fn early_spaghetti_cancels_and_fails() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        d.queue().start_run_at(Utc::now() - Duration::seconds(10));

        d.action(Action::Spaghetti, PrinterStatus::Busy, None, &[]);
        assert_eq!(d.state(), DriverState::SpaghettiRecovery);
        tick(&mut d, PrinterStatus::Busy);
        assert_eq!(d.state(), DriverState::SpaghettiRecovery);
        tick(&mut d, PrinterStatus::Paused);
        assert_eq!(d.state(), DriverState::Failure);
        assert_eq!(calls(&d), vec!["start:a.gcode", "cancel"]);
    }

    #[test]
    fn late_spaghetti_waits_for_the_user() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        d.queue().start_run_at(Utc::now() - Duration::seconds(4000));

        d.action(Action::Spaghetti, PrinterStatus::Busy, None, &[]);
        assert_eq!(d.state(), DriverState::Paused);
        assert_eq!(d.status(), "Paused after 1 hours (>1 hours); awaiting user");
        tick(&mut d, PrinterStatus::Paused);
        assert_eq!(d.state(), DriverState::Paused);
        assert!(!calls(&d).contains(&"cancel"));
    }

    #[test]
    fn spaghetti_without_retry_on_pause_waits_for_the_user() {
        let mut d = driver();
        d.set_retry_on_pause(false, 3, 3600);
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        d.queue().start_run_at(Utc::now() - Duration::seconds(10));
        d.action(Action::Spaghetti, PrinterStatus::Busy, None, &[]);
        assert_eq!(d.state(), DriverState::Paused);
    }

    #[test]
    fn manual_pause_waits_then_resumes() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        tick(&mut d, PrinterStatus::Paused);
        tick(&mut d, PrinterStatus::Paused);
        assert_eq!(d.state(), DriverState::Paused);
        assert_eq!(d.status(), "Queue paused");
        tick(&mut d, PrinterStatus::Busy);
        assert_eq!(d.state(), DriverState::Printing);
    }

    #[test]
    fn paused_goes_inactive_on_idle_or_activate() {
        let mut d = driver();
        d.state = DriverState::Paused;
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Inactive);

        d.state = DriverState::Paused;
        d.action(Action::Activate, PrinterStatus::Paused, None, &[]);
        assert_eq!(d.state(), DriverState::Inactive);
    }

    #[test]
    fn failures_retry_until_max_retries_then_give_up() {
        let mut d = driver();
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);

        for attempt in 1..=2 {
            d.action(Action::Failure, PrinterStatus::Busy, None, &[]);
            assert_eq!(d.state(), DriverState::Failure);
            tick(&mut d, PrinterStatus::Busy);
            assert_eq!(d.state(), DriverState::Failure, "waits for idle");
            tick(&mut d, PrinterStatus::Idle);
            assert_eq!(d.state(), DriverState::StartClearing);
            assert_eq!(d.retries(), attempt);
            tick(&mut d, PrinterStatus::Idle);
            assert_eq!(d.state(), DriverState::Clearing);
            tick(&mut d, PrinterStatus::Idle);
            assert_eq!(d.state(), DriverState::Printing);
        }
        assert!(d.queue().ended.borrow().is_empty());

        d.action(Action::Failure, PrinterStatus::Idle, None, &[]);
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Inactive);
        assert_eq!(*d.queue().ended.borrow(), vec![RunResult::Failure]);
        assert_eq!(d.queue().begun.get(), 3);
        let starts = calls(&d).iter().filter(|c| c.starts_with("start:")).count();
        assert_eq!(starts, 3);
    }

    #[test]
    fn activate_resets_retries() {
        let mut d = driver();
        d.state = DriverState::Failure;
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.retries(), 1);
        d.action(Action::Deactivate, PrinterStatus::Idle, None, &[]);
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        assert_eq!(d.retries(), 0);
    }

    #[test]
    fn material_gate_waits_for_the_right_spool() {
        let mut d = driver_with(Some(set_with("red.gcode", vec![Some("PLA-Red".into())])));
        d.action(Action::Activate, PrinterStatus::Idle, None, &[Some("PLA-Black".into())]);
        assert_eq!(d.state(), DriverState::StartPrint);
        assert_eq!(d.status(), "Waiting for spool PLA-Red in tool 0 (currently: PLA-Black)");
        assert_eq!(d.queue().begun.get(), 0);

        // Omitted materials keep the last known spools.
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::StartPrint);

        d.action(Action::Tick, PrinterStatus::Idle, None, &[Some("PLA-Red".into())]);
        assert_eq!(d.state(), DriverState::Printing);
        assert_eq!(calls(&d), vec!["start:red.gcode"]);
    }

    #[test]
    fn unconstrained_slots_do_not_block() {
        let mut d = driver_with(Some(set_with("b.gcode", vec![None, Some("tool2mat".into())])));
        d.action(Action::Activate, PrinterStatus::Idle, None, &[None, Some("tool2mat".into())]);
        assert_eq!(d.state(), DriverState::Printing);
    }

    #[test]
    fn no_work_goes_inactive() {
        let mut d = driver_with(None);
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        assert_eq!(d.state(), DriverState::Inactive);
        assert_eq!(d.status(), "No work to do; going inactive");
    }

    #[test]
    fn start_print_waits_for_idle_and_retries_refusals() {
        let mut d = driver();
        d.state = DriverState::StartPrint;
        tick(&mut d, PrinterStatus::Busy);
        assert_eq!(d.status(), "Waiting for printer to be ready");

        let mut d = driver();
        d.runner.refuse_start = true;
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        assert_eq!(d.state(), DriverState::StartPrint);
        d.runner.refuse_start = false;
        tick(&mut d, PrinterStatus::Idle);
        assert_eq!(d.state(), DriverState::Printing);
    }

    #[test]
    fn start_clearing_waits_for_idle() {
        let mut d = driver();
        d.state = DriverState::StartClearing;
        tick(&mut d, PrinterStatus::Busy);
        tick(&mut d, PrinterStatus::Paused);
        assert_eq!(d.state(), DriverState::StartClearing);
        assert!(calls(&d).is_empty());
    }

    #[test]
    fn clearing_failure_aborts() {
        for state in [DriverState::StartClearing, DriverState::Clearing] {
            let mut d = driver();
            d.state = state;
            d.action(Action::Failure, PrinterStatus::Idle, None, &[]);
            assert_eq!(d.state(), DriverState::Inactive);
            assert_eq!(d.status(), "Error occurred clearing bed - aborting");
        }
    }

    #[test]
    fn pause_during_scripts_is_ignored() {
        let mut d = driver();
        d.state = DriverState::Clearing;
        tick(&mut d, PrinterStatus::Paused);
        assert_eq!(d.state(), DriverState::Clearing);
        assert_eq!(d.status(), "Clearing bed");

        d.state = DriverState::Finishing;
        tick(&mut d, PrinterStatus::Paused);
        assert_eq!(d.state(), DriverState::Finishing);
        assert!(calls(&d).is_empty());
    }

    #[test]
    fn finishing_ends_on_any_result() {
        for action in [Action::Success, Action::Failure] {
            let mut d = driver();
            d.state = DriverState::Finishing;
            d.action(action, PrinterStatus::Busy, None, &[]);
            assert_eq!(d.state(), DriverState::Inactive);
        }
    }

    #[test]
    fn queue_errors_become_status_and_keep_state() {
        let mut d = driver();
        d.queue().broken.set(true);
        assert!(d.action(Action::Activate, PrinterStatus::Idle, None, &[]));
        assert_eq!(d.state(), DriverState::Inactive);
        assert!(d.status().starts_with("The print queue database had a problem."));

        d.queue().broken.set(false);
        d.action(Action::Activate, PrinterStatus::Idle, None, &[]);
        assert_eq!(d.state(), DriverState::Printing);
    }

    #[test]
    fn protocol_words_parse() {
        assert_eq!("SUCCESS".parse::<Action>().expect("action"), Action::Success);
        assert_eq!("busy".parse::<PrinterStatus>().expect("status"), PrinterStatus::Busy);
        assert!(matches!("explode".parse::<Action>(), Err(PrintloopError::InvalidEvent(_))));
        assert!("warm".parse::<PrinterStatus>().is_err());
    }
}
