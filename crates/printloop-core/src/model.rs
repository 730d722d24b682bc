// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Work-accounting model: queues own jobs, jobs own sets, and runs record
// every attempt at printing a set.
//
// `count` is how much repeatable work is wanted and `remaining` how much is
// left; every method here keeps `0 <= remaining <= count` and `count > 0`.
// The storage layer repeats those bounds as CHECK constraints.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PrintloopError, Result};
use crate::types::{ARCHIVE_QUEUE, JobId, RunId, RunResult, SetId, Strategy};

fn checked_count(count: u32) -> Result<u32> {
    if count == 0 {
        return Err(PrintloopError::InvalidCount(0));
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// A named, ranked container of jobs targeting one printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    /// Lower ranks are scheduled first.
    pub rank: f64,
    pub strategy: Strategy,
    /// `None` for a local queue, otherwise the address of a remote queue.
    pub addr: Option<String>,
    pub created: DateTime<Utc>,
}

impl Queue {
    pub fn new(name: impl Into<String>, rank: f64, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            rank,
            strategy,
            addr: None,
            created: Utc::now(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.addr.is_none()
    }

    /// Whether this printer may pull work from the queue.
    ///
    /// Remote queues belong to other printers and the archive only holds
    /// history, so neither is scheduled here.
    pub fn is_schedulable(&self) -> bool {
        self.is_local() && self.name != ARCHIVE_QUEUE
    }
}

// ---------------------------------------------------------------------------
// Set
// ---------------------------------------------------------------------------

/// One printable file inside a job, repeated `count` times per pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintSet {
    pub id: SetId,
    pub job_id: JobId,
    pub path: String,
    /// File lives on the printer's own storage rather than the host.
    pub sd: bool,
    pub rank: f64,
    pub count: u32,
    pub remaining: u32,
    /// Required material per tool slot; `None` means any material.
    pub materials: Vec<Option<String>>,
}

impl PrintSet {
    /// Create an unsaved set with `remaining == count`.
    pub fn new(path: impl Into<String>, count: u32) -> Result<Self> {
        let count = checked_count(count)?;
        Ok(Self {
            id: SetId(0),
            job_id: JobId(0),
            path: path.into(),
            sd: false,
            rank: 0.0,
            count,
            remaining: count,
            materials: Vec::new(),
        })
    }

    pub fn with_materials(mut self, materials: Vec<Option<String>>) -> Self {
        self.materials = materials;
        self
    }

    pub fn with_rank(mut self, rank: f64) -> Self {
        self.rank = rank;
        self
    }

    pub fn is_incomplete(&self) -> bool {
        self.remaining > 0
    }

    /// Use up one repeat of this set. Stays at zero once exhausted.
    pub fn decrement(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Material keys as stored: comma-separated, empty entry for no constraint.
    pub fn material_keys(&self) -> String {
        self.materials
            .iter()
            .map(|m| m.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Inverse of [`PrintSet::material_keys`].
    pub fn parse_material_keys(keys: &str) -> Vec<Option<String>> {
        if keys.is_empty() {
            return Vec::new();
        }
        keys.split(',')
            .map(|k| {
                let k = k.trim();
                if k.is_empty() { None } else { Some(k.to_string()) }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A repeatable group of sets. `count` full passes over the sets are wanted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub name: String,
    /// Drafts are still being edited and are never scheduled.
    pub draft: bool,
    pub rank: f64,
    pub count: u32,
    pub remaining: u32,
    pub created: DateTime<Utc>,
    /// Held by this printer as the job currently being worked.
    pub acquired: bool,
    /// Owned sets, kept sorted by rank.
    pub sets: Vec<PrintSet>,
}

impl Job {
    /// Create an unsaved, non-draft job with `remaining == count`.
    pub fn new(queue: impl Into<String>, name: impl Into<String>, count: u32) -> Result<Self> {
        let count = checked_count(count)?;
        Ok(Self {
            id: JobId(0),
            queue: queue.into(),
            name: name.into(),
            draft: false,
            rank: 0.0,
            count,
            remaining: count,
            created: Utc::now(),
            acquired: false,
            sets: Vec::new(),
        })
    }

    pub fn with_sets(mut self, sets: Vec<PrintSet>) -> Self {
        self.sets = sets;
        self.sort_sets();
        self
    }

    pub fn sort_sets(&mut self) {
        self.sets.sort_by(|a, b| a.rank.total_cmp(&b.rank).then(a.id.cmp(&b.id)));
    }

    pub fn set(&self, id: SetId) -> Option<&PrintSet> {
        self.sets.iter().find(|s| s.id == id)
    }

    pub fn has_incomplete_sets(&self) -> bool {
        self.sets.iter().any(PrintSet::is_incomplete)
    }

    pub fn has_work(&self) -> bool {
        self.has_incomplete_sets() || self.remaining > 0
    }

    /// Finish one pass. If passes remain, every set is refilled for the next
    /// one. Returns whether the job still has work.
    pub fn decrement(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            for s in &mut self.sets {
                s.remaining = s.count;
            }
        }
        self.has_work()
    }

    /// Reconcile counters before scheduling. A job with passes left but no
    /// partially-done sets rolls over into a fresh pass. Returns whether the
    /// job has work.
    pub fn normalize(&mut self) -> bool {
        if self.remaining == 0 {
            return self.has_incomplete_sets();
        }
        if self.has_incomplete_sets() {
            return true;
        }
        self.decrement()
    }

    /// The set to print next, normalizing first.
    pub fn next_set(&mut self) -> Option<&PrintSet> {
        if !self.normalize() {
            return None;
        }
        self.sets.iter().find(|s| s.is_incomplete())
    }

    /// Account for one finished print of `set_id`.
    ///
    /// Decrements the set and, when that leaves the pass without incomplete
    /// sets, decrements the job as well. Returns whether the job still has
    /// work.
    pub fn complete_set(&mut self, set_id: SetId) -> Result<bool> {
        let set = self
            .sets
            .iter_mut()
            .find(|s| s.id == set_id)
            .ok_or_else(|| PrintloopError::NotFound(format!("set {set_id} in job {}", self.id)))?;
        set.decrement();
        if !self.has_incomplete_sets() {
            return Ok(self.decrement());
        }
        Ok(true)
    }

    /// Restore the job and all of its sets to their full counts.
    pub fn reset(&mut self) {
        self.remaining = self.count;
        for s in &mut self.sets {
            s.remaining = s.count;
        }
    }

    /// Change the desired pass count, clamping `remaining` into bounds.
    pub fn set_count(&mut self, count: u32) -> Result<()> {
        self.count = checked_count(count)?;
        self.remaining = self.remaining.min(self.count);
        Ok(())
    }

    /// Set `remaining`, clamped to `count`.
    pub fn set_remaining(&mut self, remaining: u32) {
        self.remaining = remaining.min(self.count);
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// History record of one attempt at printing a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub queue_name: String,
    pub job_name: String,
    pub job_id: JobId,
    pub path: String,
    pub start: DateTime<Utc>,
    /// `None` while the run is in progress.
    pub end: Option<DateTime<Utc>>,
    pub result: Option<RunResult>,
}

impl Run {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Time since the run started.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(id: i64, count: u32) -> PrintSet {
        let mut s = PrintSet::new(format!("s{id}.gcode"), count).unwrap();
        s.id = SetId(id);
        s.rank = id as f64;
        s
    }

    fn job(count: u32, sets: Vec<PrintSet>) -> Job {
        Job::new("local", "j", count).unwrap().with_sets(sets)
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(matches!(PrintSet::new("a", 0), Err(PrintloopError::InvalidCount(0))));
        assert!(matches!(Job::new("q", "j", 0), Err(PrintloopError::InvalidCount(0))));
    }

    #[test]
    fn set_decrement_floors_at_zero() {
        let mut s = set(1, 2);
        s.decrement();
        s.decrement();
        s.decrement();
        assert_eq!(s.remaining, 0);
        s.decrement();
        assert_eq!(s.remaining, 0);
    }

    #[test]
    fn job_decrement_floors_at_zero() {
        let mut j = job(1, vec![]);
        assert!(!j.decrement());
        assert!(!j.decrement());
        assert_eq!(j.remaining, 0);
    }

    #[test]
    fn decrement_with_passes_left_refills_sets() {
        let mut a = set(1, 2);
        a.remaining = 0;
        let mut j = job(3, vec![a]);
        assert!(j.decrement());
        assert_eq!(j.remaining, 2);
        assert_eq!(j.sets[0].remaining, 2);
    }

    #[test]
    fn has_work_false_only_when_everything_is_exhausted() {
        let mut j = job(1, vec![set(1, 1), set(2, 1)]);
        j.remaining = 0;
        assert!(j.has_work());
        j.sets[0].remaining = 0;
        assert!(j.has_work());
        j.sets[1].remaining = 0;
        assert!(!j.has_work());
        j.remaining = 1;
        assert!(j.has_work());
    }

    #[test]
    fn normalize_rolls_over_into_a_fresh_pass() {
        let mut a = set(1, 1);
        a.remaining = 0;
        let mut j = job(2, vec![a]);
        assert!(j.normalize());
        assert_eq!(j.remaining, 1);
        assert_eq!(j.sets[0].remaining, 1);
    }

    #[test]
    fn normalize_keeps_a_partial_pass() {
        let mut j = job(2, vec![set(1, 1)]);
        j.remaining = 0;
        assert!(j.normalize());
        assert_eq!(j.remaining, 0);
    }

    #[test]
    fn normalize_on_a_single_pass_job_exhausts_it() {
        let mut a = set(1, 1);
        a.remaining = 0;
        let mut j = job(1, vec![a]);
        assert!(!j.normalize());
        assert_eq!(j.remaining, 0);
    }

    #[test]
    fn next_set_follows_rank() {
        let mut j = job(1, vec![set(2, 1), set(1, 1)]);
        assert_eq!(j.next_set().map(|s| s.id), Some(SetId(1)));
        j.sets[0].remaining = 0;
        assert_eq!(j.next_set().map(|s| s.id), Some(SetId(2)));
    }

    #[test]
    fn completing_the_last_set_of_a_pass_starts_the_next_pass() {
        let mut j = job(2, vec![set(1, 1), set(2, 1)]);
        assert!(j.complete_set(SetId(1)).unwrap());
        assert_eq!(j.remaining, 2);
        assert!(j.complete_set(SetId(2)).unwrap());
        assert_eq!(j.remaining, 1);
        assert!(j.sets.iter().all(|s| s.remaining == 1));
        assert!(j.complete_set(SetId(1)).unwrap());
        assert!(!j.complete_set(SetId(2)).unwrap());
        assert_eq!(j.remaining, 0);
        assert!(!j.has_work());
    }

    #[test]
    fn complete_set_of_a_foreign_set_is_an_error() {
        let mut j = job(1, vec![set(1, 1)]);
        assert!(matches!(j.complete_set(SetId(9)), Err(PrintloopError::NotFound(_))));
    }

    #[test]
    fn counters_stay_in_bounds() {
        let mut j = job(2, vec![set(1, 3)]);
        for _ in 0..20 {
            let id = j.sets[0].id;
            let _ = j.complete_set(id);
            assert!(j.remaining <= j.count);
            assert!(j.sets.iter().all(|s| s.remaining <= s.count));
        }
        assert_eq!(j.remaining, 0);
        assert_eq!(j.sets[0].remaining, 0);
    }

    #[test]
    fn set_count_clamps_remaining() {
        let mut j = job(5, vec![]);
        j.set_count(2).unwrap();
        assert_eq!(j.remaining, 2);
        j.set_remaining(9);
        assert_eq!(j.remaining, 2);
        assert!(j.set_count(0).is_err());
    }

    #[test]
    fn reset_refills_everything() {
        let mut j = job(2, vec![set(1, 2)]);
        j.remaining = 0;
        j.sets[0].remaining = 0;
        j.reset();
        assert_eq!(j.remaining, 2);
        assert_eq!(j.sets[0].remaining, 2);
    }

    #[test]
    fn material_keys_keep_empty_slots() {
        let s = set(1, 1).with_materials(vec![None, Some("PLA_Red".into())]);
        assert_eq!(s.material_keys(), ",PLA_Red");
        assert_eq!(PrintSet::parse_material_keys(",PLA_Red"), s.materials);
        assert!(PrintSet::parse_material_keys("").is_empty());
    }

    #[test]
    fn open_run_reports_elapsed_time() {
        let now = Utc::now();
        let mut r = Run {
            id: RunId(1),
            queue_name: "local".into(),
            job_name: "j".into(),
            job_id: JobId(1),
            path: "a.gcode".into(),
            start: now - Duration::seconds(30),
            end: None,
            result: None,
        };
        assert!(r.is_open());
        assert_eq!(r.elapsed(now).num_seconds(), 30);
        r.end = Some(now);
        r.result = Some(RunResult::Success);
        assert!(!r.is_open());
    }

    #[test]
    fn archive_and_remote_queues_are_not_schedulable() {
        assert!(Queue::new("local", 0.0, Strategy::InOrder).is_schedulable());
        assert!(!Queue::new(ARCHIVE_QUEUE, -1.0, Strategy::InOrder).is_schedulable());
        let mut remote = Queue::new("lan", 1.0, Strategy::InOrder);
        remote.addr = Some("10.0.0.2:6789".into());
        assert!(!remote.is_schedulable());
    }
}
