// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue facade: the small surface the driver needs (select, begin, end) plus
// the admin operations used to fill and reorder the queues.
//
// Storage and the current selection live behind one mutex so that selecting
// a set, opening a run, and decrementing counters can never interleave with an
// admin edit of the same job.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, instrument, warn};

use printloop_core::error::{PrintloopError, Result};
use printloop_core::model::{Job, PrintSet, Queue, Run};
use printloop_core::types::{JobId, QueueData, RunResult, SetId, Strategy};

use crate::storage::Storage;

/// Work selection and run accounting as seen by the driver.
pub trait WorkQueue {
    /// The selected set, acquiring the next job with work if nothing is
    /// selected. Repeated calls return the same set until `end_run`.
    fn get_set_or_acquire(&self) -> Result<Option<PrintSet>>;

    /// The selected set, without trying to acquire.
    fn get_set(&self) -> Result<Option<PrintSet>>;

    /// The open run, if any.
    fn get_run(&self) -> Result<Option<Run>>;

    /// Open a run for the selected set. `None` when nothing is selected.
    fn begin_run(&self) -> Result<Option<Run>>;

    /// Close the open run and account for one print of the selected set.
    /// Does nothing when no run is open.
    fn end_run(&self, result: RunResult) -> Result<()>;
}

impl<T: WorkQueue + ?Sized> WorkQueue for Arc<T> {
    fn get_set_or_acquire(&self) -> Result<Option<PrintSet>> {
        (**self).get_set_or_acquire()
    }

    fn get_set(&self) -> Result<Option<PrintSet>> {
        (**self).get_set()
    }

    fn get_run(&self) -> Result<Option<Run>> {
        (**self).get_run()
    }

    fn begin_run(&self) -> Result<Option<Run>> {
        (**self).begin_run()
    }

    fn end_run(&self, result: RunResult) -> Result<()> {
        (**self).end_run(result)
    }
}

/// Field changes for [`PrintQueue::update_job`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub count: Option<u32>,
    pub remaining: Option<u32>,
    pub draft: Option<bool>,
}

#[derive(Debug, Clone)]
struct Selection {
    queue: String,
    job_id: JobId,
    set_id: SetId,
}

struct Inner {
    storage: Storage,
    selection: Option<Selection>,
    run: Option<Run>,
}

impl Inner {
    fn selected_set(&mut self) -> Result<Option<PrintSet>> {
        let Some(sel) = self.selection.clone() else {
            return Ok(None);
        };
        if let Some(set) = self.storage.get_set(sel.set_id)? {
            return Ok(Some(set));
        }
        warn!(set_id = %sel.set_id, "selected set disappeared");
        let job = self.storage.get_job(sel.job_id)?;
        self.release(job)?;
        Ok(None)
    }

    /// Walk schedulable queues and their jobs in rank order and select the
    /// first set with work.
    fn acquire(&mut self) -> Result<Option<PrintSet>> {
        for queue in self.storage.queues()? {
            if !queue.is_schedulable() {
                continue;
            }
            if queue.strategy != Strategy::InOrder {
                warn!(
                    queue = %queue.name,
                    strategy = queue.strategy.as_str(),
                    "strategy not schedulable, skipping queue"
                );
                continue;
            }
            for mut job in self.storage.jobs_in_queue(&queue.name)? {
                // A job without sets has nothing to print; normalizing it
                // would only burn its passes.
                if job.draft || job.sets.is_empty() {
                    continue;
                }
                let before = job.clone();
                let Some(set) = job.next_set().cloned() else {
                    if job != before {
                        self.storage.save_job(&job)?;
                    }
                    continue;
                };
                job.acquired = true;
                self.storage.save_job(&job)?;
                self.run = self.storage.active_run(&queue.name, job.id, &set.path)?;
                self.selection = Some(Selection {
                    queue: queue.name.clone(),
                    job_id: job.id,
                    set_id: set.id,
                });
                info!(
                    queue = %queue.name,
                    job_id = %job.id,
                    set_id = %set.id,
                    path = %set.path,
                    "acquired work"
                );
                return Ok(Some(set));
            }
        }
        debug!("no work in any queue");
        Ok(None)
    }

    /// Clear the acquired flag of a job and drop the selection. An open run
    /// is closed as failed without accounting. `None` means the job is
    /// already gone, and its runs with it.
    fn release(&mut self, job: Option<Job>) -> Result<()> {
        if let Some(mut job) = job {
            job.acquired = false;
            match &self.run {
                Some(run) => self.storage.finish_run(run.id, RunResult::Failure, &job)?,
                None => self.storage.save_job(&job)?,
            }
            info!(job_id = %job.id, "job released");
        }
        self.selection = None;
        self.run = None;
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        let Some(mut job) = self.storage.acquired_job()? else {
            return Ok(());
        };
        let next = if job.sets.is_empty() {
            None
        } else {
            job.next_set().cloned()
        };
        match next {
            Some(set) => {
                self.storage.save_job(&job)?;
                self.run = self.storage.active_run(&job.queue, job.id, &set.path)?;
                info!(
                    job_id = %job.id,
                    set_id = %set.id,
                    open_run = self.run.is_some(),
                    "resumed acquired job"
                );
                self.selection = Some(Selection {
                    queue: job.queue.clone(),
                    job_id: job.id,
                    set_id: set.id,
                });
                Ok(())
            }
            None => self.release(Some(job)),
        }
    }
}

/// SQLite-backed [`WorkQueue`] with the admin operations for its contents.
pub struct PrintQueue {
    inner: Mutex<Inner>,
}

impl PrintQueue {
    /// Wrap storage, resuming a job a previous process left acquired.
    pub fn new(storage: Storage) -> Result<Self> {
        let mut inner = Inner {
            storage,
            selection: None,
            run: None,
        };
        inner.restore()?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| PrintloopError::LockPoisoned)
    }

    // -- Queues --------------------------------------------------------------

    pub fn add_queue(&self, queue: Queue) -> Result<()> {
        self.lock()?.storage.add_queue(&queue)
    }

    /// Delete a queue with all of its jobs. Releases the selection if it was
    /// in that queue.
    pub fn remove_queue(&self, name: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        let removed = inner.storage.remove_queue(name)?;
        if removed && inner.selection.as_ref().is_some_and(|s| s.queue == name) {
            // The cascade took the job and its runs.
            inner.selection = None;
            inner.run = None;
        }
        Ok(removed)
    }

    pub fn queues(&self) -> Result<Vec<Queue>> {
        self.lock()?.storage.queues()
    }

    // -- Jobs and sets -------------------------------------------------------

    /// Append a new job with the given sets to the end of `queue`.
    #[instrument(skip(self, sets))]
    pub fn add_job(&self, queue: &str, name: &str, count: u32, sets: Vec<PrintSet>) -> Result<Job> {
        let mut inner = self.lock()?;
        if inner.storage.queue(queue)?.is_none() {
            return Err(PrintloopError::NotFound(format!("queue {queue}")));
        }
        let mut job = Job::new(queue, name, count)?;
        job.rank = inner.storage.next_job_rank(queue)?;
        job.sets = sets
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.with_rank(i as f64))
            .collect();
        inner.storage.insert_job(&job)
    }

    /// Append a set to the end of an existing job.
    pub fn append_set(&self, job_id: JobId, set: PrintSet) -> Result<PrintSet> {
        let inner = self.lock()?;
        if inner.storage.get_job(job_id)?.is_none() {
            return Err(PrintloopError::NotFound(format!("job {job_id}")));
        }
        let rank = inner.storage.next_set_rank(job_id)?;
        inner.storage.insert_set(job_id, &set.with_rank(rank))
    }

    pub fn job(&self, job_id: JobId) -> Result<Option<Job>> {
        self.lock()?.storage.get_job(job_id)
    }

    /// Apply field changes to a job, keeping its counters in bounds.
    pub fn update_job(&self, job_id: JobId, update: JobUpdate) -> Result<Job> {
        let mut inner = self.lock()?;
        let mut job = inner
            .storage
            .get_job(job_id)?
            .ok_or_else(|| PrintloopError::NotFound(format!("job {job_id}")))?;
        if let Some(name) = update.name {
            job.name = name;
        }
        if let Some(count) = update.count {
            job.set_count(count)?;
        }
        if let Some(remaining) = update.remaining {
            job.set_remaining(remaining);
        }
        if let Some(draft) = update.draft {
            job.draft = draft;
        }
        inner.storage.save_job(&job)?;
        Ok(job)
    }

    /// Move a job directly after `after` in its queue, or to the front.
    pub fn move_job(&self, job_id: JobId, after: Option<JobId>) -> Result<()> {
        let mut inner = self.lock()?;
        let mut job = inner
            .storage
            .get_job(job_id)?
            .ok_or_else(|| PrintloopError::NotFound(format!("job {job_id}")))?;
        let ranks: Vec<(JobId, f64)> = inner
            .storage
            .jobs_in_queue(&job.queue)?
            .into_iter()
            .filter(|j| j.id != job_id)
            .map(|j| (j.id, j.rank))
            .collect();
        job.rank = rank_after(&ranks, after).ok_or_else(|| {
            PrintloopError::NotFound(format!("job {}", after.map_or(0, |a| a.0)))
        })?;
        inner.storage.save_job(&job)?;
        debug!(job_id = %job_id, rank = job.rank, "job moved");
        Ok(())
    }

    /// Move a set into `dest_job`, directly after `after` or to the front.
    pub fn move_set(&self, set_id: SetId, after: Option<SetId>, dest_job: JobId) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.storage.get_set(set_id)?.is_none() {
            return Err(PrintloopError::NotFound(format!("set {set_id}")));
        }
        let dest = inner
            .storage
            .get_job(dest_job)?
            .ok_or_else(|| PrintloopError::NotFound(format!("job {dest_job}")))?;
        let ranks: Vec<(SetId, f64)> = dest
            .sets
            .iter()
            .filter(|s| s.id != set_id)
            .map(|s| (s.id, s.rank))
            .collect();
        let rank = rank_after(&ranks, after).ok_or_else(|| {
            PrintloopError::NotFound(format!("set {}", after.map_or(0, |a| a.0)))
        })?;
        inner.storage.move_set(set_id, dest_job, rank)?;
        if inner
            .selection
            .as_ref()
            .is_some_and(|s| s.set_id == set_id && s.job_id != dest_job)
        {
            let old = inner.selection.as_ref().map(|s| s.job_id);
            let old_job = match old {
                Some(id) => inner.storage.get_job(id)?,
                None => None,
            };
            inner.release(old_job)?;
        }
        Ok(())
    }

    /// Delete jobs and sets. Releases the selection if it pointed at either.
    pub fn remove(&self, job_ids: &[JobId], set_ids: &[SetId]) -> Result<(usize, usize)> {
        let mut inner = self.lock()?;
        let affected = inner.selection.clone().filter(|s| {
            job_ids.contains(&s.job_id) || set_ids.contains(&s.set_id)
        });
        let removed = inner.storage.remove(job_ids, set_ids)?;
        if let Some(sel) = affected {
            let job = inner.storage.get_job(sel.job_id)?;
            inner.release(job)?;
        }
        Ok(removed)
    }

    /// Restore jobs and their sets to full counts.
    pub fn reset_jobs(&self, job_ids: &[JobId]) -> Result<()> {
        let mut inner = self.lock()?;
        for id in job_ids {
            if let Some(mut job) = inner.storage.get_job(*id)? {
                job.reset();
                inner.storage.save_job(&job)?;
            }
        }
        Ok(())
    }

    // -- History -------------------------------------------------------------

    pub fn history(&self) -> Result<Vec<Run>> {
        self.lock()?.storage.history()
    }

    pub fn clear_history(&self) -> Result<usize> {
        self.lock()?.storage.clear_history()
    }

    /// Every queue with its jobs, for status displays.
    pub fn snapshot(&self) -> Result<Vec<QueueData>> {
        let inner = self.lock()?;
        let active = inner.selection.clone();
        inner
            .storage
            .queues()?
            .into_iter()
            .map(|q| -> Result<QueueData> {
                let jobs = inner.storage.jobs_in_queue(&q.name)?;
                let active_set = active
                    .as_ref()
                    .filter(|s| s.queue == q.name)
                    .map(|s| s.set_id);
                Ok(QueueData {
                    name: q.name,
                    strategy: q.strategy,
                    rank: q.rank,
                    addr: q.addr,
                    jobs,
                    active_set,
                })
            })
            .collect()
    }
}

impl WorkQueue for PrintQueue {
    fn get_set_or_acquire(&self) -> Result<Option<PrintSet>> {
        let mut inner = self.lock()?;
        if let Some(set) = inner.selected_set()? {
            return Ok(Some(set));
        }
        inner.acquire()
    }

    fn get_set(&self) -> Result<Option<PrintSet>> {
        self.lock()?.selected_set()
    }

    fn get_run(&self) -> Result<Option<Run>> {
        Ok(self.lock()?.run.clone())
    }

    fn begin_run(&self) -> Result<Option<Run>> {
        let mut inner = self.lock()?;
        let Some(sel) = inner.selection.clone() else {
            return Ok(None);
        };
        if let Some(prev) = inner.run.clone() {
            // A retry: the earlier attempt failed without being accounted.
            inner.storage.end_run(prev.id, RunResult::Failure)?;
            inner.run = None;
        }
        let Some(job) = inner.storage.get_job(sel.job_id)? else {
            inner.selection = None;
            return Ok(None);
        };
        let Some(path) = job.set(sel.set_id).map(|s| s.path.clone()) else {
            inner.release(Some(job))?;
            return Ok(None);
        };
        let run = inner.storage.begin_run(&sel.queue, &job, &path)?;
        inner.run = Some(run.clone());
        Ok(Some(run))
    }

    fn end_run(&self, result: RunResult) -> Result<()> {
        let mut inner = self.lock()?;
        // The run stays in memory until storage commits, so a failed write
        // is retried in full by the next call.
        let Some(run) = inner.run.clone() else {
            return Ok(());
        };
        let selected = match inner.selection.clone() {
            Some(sel) => inner.storage.get_job(sel.job_id)?.map(|job| (sel, job)),
            None => None,
        };
        let Some((sel, mut job)) = selected else {
            inner.storage.end_run(run.id, result)?;
            inner.run = None;
            inner.selection = None;
            return Ok(());
        };

        let next = if job.set(sel.set_id).is_some() && job.complete_set(sel.set_id)? {
            job.next_set().cloned()
        } else {
            None
        };
        if next.is_none() {
            job.acquired = false;
        }
        inner.storage.finish_run(run.id, result, &job)?;
        inner.run = None;

        match next {
            Some(next) => {
                debug!(job_id = %job.id, set_id = %next.id, "next set selected");
                inner.selection = Some(Selection {
                    set_id: next.id,
                    ..sel
                });
            }
            None => {
                info!(job_id = %job.id, "job released");
                inner.selection = None;
            }
        }
        Ok(())
    }
}

/// Rank that places an item directly after `after` among `siblings` (sorted by
/// rank), or before all of them when `after` is `None`. `None` if `after` is
/// not among the siblings.
fn rank_after<I: PartialEq + Copy>(siblings: &[(I, f64)], after: Option<I>) -> Option<f64> {
    let Some(after) = after else {
        return Some(siblings.first().map_or(0.0, |(_, r)| r - 1.0));
    };
    let idx = siblings.iter().position(|(id, _)| *id == after)?;
    let prev = siblings[idx].1;
    Some(match siblings.get(idx + 1) {
        Some((_, next)) => (prev + next) / 2.0,
        None => prev + 1.0,
    })
}
