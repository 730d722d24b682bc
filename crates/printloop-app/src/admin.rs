// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue administration: JSON job import and the admin commands accepted on
// the event feed.
//
// An import manifest lists queues to create and jobs to append:
//
//     {
//       "queues": [{ "name": "shelf", "rank": 1.0 }],
//       "jobs": [{
//         "queue": "local", "name": "brackets", "count": 2,
//         "sets": [{ "path": "bracket.gcode", "count": 4, "materials": ["PLA_Red", null] }]
//       }]
//     }
//
// The whole manifest is checked before anything is written, so a bad file
// adds nothing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, instrument};

use printloop_core::error::{PrintloopError, Result};
use printloop_core::model::{PrintSet, Queue};
use printloop_core::types::{DEFAULT_QUEUE, JobId, SetId, Strategy};
use printloop_queue::{JobUpdate, PrintQueue};

/// Manifest picked up from the data directory at startup.
pub const IMPORT_FILE: &str = "import.json";

/// Suffix given to a startup manifest once it has been imported.
pub const IMPORTED_SUFFIX: &str = "done";

fn one() -> u32 {
    1
}

fn in_order() -> Strategy {
    Strategy::InOrder
}

fn local_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

/// Queues and jobs to add.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub queues: Vec<QueueEntry>,
    pub jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
pub struct QueueEntry {
    pub name: String,
    /// Appended after the existing queues when absent.
    #[serde(default)]
    pub rank: Option<f64>,
    #[serde(default = "in_order")]
    pub strategy: Strategy,
}

#[derive(Debug, Deserialize)]
pub struct JobEntry {
    #[serde(default = "local_queue")]
    pub queue: String,
    pub name: String,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default)]
    pub draft: bool,
    pub sets: Vec<SetEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SetEntry {
    pub path: String,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default)]
    pub sd: bool,
    #[serde(default)]
    pub materials: Vec<Option<String>>,
}

impl SetEntry {
    fn to_set(&self) -> Result<PrintSet> {
        let mut set = PrintSet::new(self.path.clone(), self.count)?
            .with_materials(self.materials.clone());
        set.sd = self.sd;
        Ok(set)
    }
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// What an import added.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Imported {
    pub queues: usize,
    pub jobs: usize,
}

/// Add the manifest's queues and jobs. Queues that already exist are left
/// as they are; jobs are always appended.
#[instrument(skip_all, fields(queues = manifest.queues.len(), jobs = manifest.jobs.len()))]
pub fn import(queue: &PrintQueue, manifest: &Manifest) -> Result<Imported> {
    let existing = queue.queues()?;
    let mut known: HashSet<&str> = existing.iter().map(|q| q.name.as_str()).collect();
    let mut new_queues = Vec::new();
    for entry in &manifest.queues {
        if known.insert(entry.name.as_str()) {
            new_queues.push(entry);
        } else {
            info!(queue = %entry.name, "queue already exists; keeping it");
        }
    }

    let mut jobs = Vec::with_capacity(manifest.jobs.len());
    for entry in &manifest.jobs {
        if !known.contains(entry.queue.as_str()) {
            return Err(PrintloopError::InvalidImport(format!(
                "job {} targets unknown queue {}",
                entry.name, entry.queue
            )));
        }
        if entry.count == 0 {
            return Err(PrintloopError::InvalidCount(0));
        }
        if entry.sets.is_empty() {
            return Err(PrintloopError::InvalidImport(format!(
                "job {} has no sets",
                entry.name
            )));
        }
        let sets = entry.sets.iter().map(SetEntry::to_set).collect::<Result<Vec<_>>>()?;
        jobs.push((entry, sets));
    }

    let mut next_rank = existing.iter().map(|q| q.rank).fold(0.0_f64, f64::max) + 1.0;
    for entry in &new_queues {
        let rank = entry.rank.unwrap_or(next_rank);
        next_rank = next_rank.max(rank + 1.0);
        queue.add_queue(Queue::new(entry.name.clone(), rank, entry.strategy))?;
    }
    for (entry, sets) in jobs {
        let job = queue.add_job(&entry.queue, &entry.name, entry.count, sets)?;
        if entry.draft {
            let update = JobUpdate {
                draft: Some(true),
                ..Default::default()
            };
            queue.update_job(job.id, update)?;
        }
    }

    let imported = Imported {
        queues: new_queues.len(),
        jobs: manifest.jobs.len(),
    };
    info!(queues = imported.queues, jobs = imported.jobs, "import complete");
    Ok(imported)
}

pub fn import_file(queue: &PrintQueue, path: &Path) -> Result<Imported> {
    import(queue, &Manifest::load(path)?)
}

/// Import `import.json` from the data directory if present, then rename it so
/// the next start does not import it again.
pub fn import_pending(queue: &PrintQueue, data_dir: &Path) -> Result<Option<Imported>> {
    let path = data_dir.join(IMPORT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let imported = import_file(queue, &path)?;
    std::fs::rename(&path, path.with_extension(format!("json.{IMPORTED_SUFFIX}")))?;
    Ok(Some(imported))
}

/// Admin commands accepted on the event feed.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    /// `import <file>`
    Import(PathBuf),
    /// `add-set <job> <path> [count]`
    AddSet { job: JobId, path: String, count: u32 },
    /// `draft <job> on|off`
    Draft { job: JobId, draft: bool },
    /// `move-job <job> <after|->`
    MoveJob { job: JobId, after: Option<JobId> },
    /// `move-set <set> <job> <after|->`
    MoveSet {
        set: SetId,
        job: JobId,
        after: Option<SetId>,
    },
    /// `reset <job>...`
    Reset(Vec<JobId>),
    /// `remove <job>...`
    Remove(Vec<JobId>),
    /// `clear-history`
    ClearHistory,
}

impl AdminCommand {
    /// Whether `word` starts an admin command rather than a driver event.
    pub fn is_keyword(word: &str) -> bool {
        matches!(
            word,
            "import" | "add-set" | "draft" | "move-job" | "move-set" | "reset" | "remove"
                | "clear-history"
        )
    }

    /// Parse the words of an admin line, keyword first.
    pub fn parse(words: &[&str]) -> Result<Self> {
        let bad = || PrintloopError::InvalidEvent(words.join(" "));
        let cmd = match words {
            ["import", path] => Self::Import(PathBuf::from(*path)),
            ["add-set", job, path] => Self::AddSet {
                job: job_id(job)?,
                path: path.to_string(),
                count: 1,
            },
            ["add-set", job, path, count] => Self::AddSet {
                job: job_id(job)?,
                path: path.to_string(),
                count: count.parse().map_err(|_| bad())?,
            },
            ["draft", job, flag] => Self::Draft {
                job: job_id(job)?,
                draft: match *flag {
                    "on" => true,
                    "off" => false,
                    _ => return Err(bad()),
                },
            },
            ["move-job", job, after] => Self::MoveJob {
                job: job_id(job)?,
                after: optional(after, job_id)?,
            },
            ["move-set", set, job, after] => Self::MoveSet {
                set: set_id(set)?,
                job: job_id(job)?,
                after: optional(after, set_id)?,
            },
            ["reset", ids @ ..] if !ids.is_empty() => {
                Self::Reset(ids.iter().map(|id| job_id(id)).collect::<Result<_>>()?)
            }
            ["remove", ids @ ..] if !ids.is_empty() => {
                Self::Remove(ids.iter().map(|id| job_id(id)).collect::<Result<_>>()?)
            }
            ["clear-history"] => Self::ClearHistory,
            _ => return Err(bad()),
        };
        Ok(cmd)
    }

    /// Run the command against the queue.
    #[instrument(skip(queue))]
    pub fn apply(&self, queue: &PrintQueue) -> Result<()> {
        match self {
            Self::Import(path) => {
                import_file(queue, path)?;
            }
            Self::AddSet { job, path, count } => {
                queue.append_set(*job, PrintSet::new(path.clone(), *count)?)?;
            }
            Self::Draft { job, draft } => {
                let update = JobUpdate {
                    draft: Some(*draft),
                    ..Default::default()
                };
                queue.update_job(*job, update)?;
            }
            Self::MoveJob { job, after } => queue.move_job(*job, *after)?,
            Self::MoveSet { set, job, after } => queue.move_set(*set, *after, *job)?,
            Self::Reset(jobs) => queue.reset_jobs(jobs)?,
            Self::Remove(jobs) => {
                queue.remove(jobs, &[])?;
            }
            Self::ClearHistory => {
                queue.clear_history()?;
            }
        }
        Ok(())
    }
}

fn job_id(word: &str) -> Result<JobId> {
    word.parse()
        .map(JobId)
        .map_err(|_| PrintloopError::InvalidEvent(format!("not a job id: {word}")))
}

fn set_id(word: &str) -> Result<SetId> {
    word.parse()
        .map(SetId)
        .map_err(|_| PrintloopError::InvalidEvent(format!("not a set id: {word}")))
}

/// `-` means "none", anything else goes through `parse`.
fn optional<T>(word: &str, parse: fn(&str) -> Result<T>) -> Result<Option<T>> {
    if word == "-" { Ok(None) } else { parse(word).map(Some) }
}
