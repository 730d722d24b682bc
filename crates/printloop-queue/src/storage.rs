// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent queue storage backed by SQLite.
//
// Four related tables hold the work-accounting model: queues own jobs, jobs
// own sets, and runs record attempts against a job.  Deleting a queue cascades
// to its jobs, and deleting a job cascades to its sets and runs.  Counter
// bounds are repeated as CHECK constraints so a bug in the model cannot write
// an out-of-range `remaining`.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument, warn};

use printloop_core::error::{PrintloopError, Result};
use printloop_core::model::{Job, PrintSet, Queue, Run};
use printloop_core::types::{
    ARCHIVE_QUEUE, DEFAULT_QUEUE, JobId, RunId, RunResult, SetId, Strategy,
};

/// Version written to `storage_details` when a database is created.
pub const SCHEMA_VERSION: &str = "0.0.1";

/// SQLite schema for all tables.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS storage_details (
        schema_version TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS queues (
        name TEXT PRIMARY KEY,
        created TEXT NOT NULL,
        rank REAL NOT NULL,
        addr TEXT,
        strategy TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue TEXT NOT NULL REFERENCES queues(name) ON DELETE CASCADE,
        name TEXT NOT NULL,
        draft INTEGER NOT NULL DEFAULT 1,
        rank REAL NOT NULL,
        count INTEGER NOT NULL DEFAULT 1 CHECK (count > 0),
        remaining INTEGER NOT NULL DEFAULT 1 CHECK (remaining >= 0 AND remaining <= count),
        created TEXT NOT NULL,
        acquired INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS sets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        sd INTEGER NOT NULL DEFAULT 0,
        rank REAL NOT NULL,
        count INTEGER NOT NULL DEFAULT 1 CHECK (count > 0),
        remaining INTEGER NOT NULL DEFAULT 1 CHECK (remaining >= 0 AND remaining <= count),
        material_keys TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue_name TEXT NOT NULL,
        job_name TEXT NOT NULL,
        job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        started TEXT NOT NULL,
        ended TEXT,
        result TEXT
    );
"#;

const JOB_COLUMNS: &str =
    "id, queue, name, draft, rank, count, remaining, created, acquired";
const SET_COLUMNS: &str = "id, job_id, path, sd, rank, count, remaining, material_keys";
const RUN_COLUMNS: &str = "id, queue_name, job_name, job_id, path, started, ended, result";

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

/// Convert a `rusqlite::Error` into a `PrintloopError::Database`.
fn db_err(e: rusqlite::Error) -> PrintloopError {
    PrintloopError::Database(e.to_string())
}

/// Queue storage on a single SQLite connection.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.  Callers that share a `Storage` between threads go through
/// [`crate::PrintQueue`], which serializes access with a mutex.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the queue database at the given path.
    ///
    /// A new file gets the full schema, the schema version, and the default
    /// queues.  An existing file must carry the expected schema version;
    /// anything else is a `SchemaMismatch` and the caller should stop.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| PrintloopError::Database(format!("open: {e}")))?;

        // WAL lets the status display read while the driver writes.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| PrintloopError::Database(format!("WAL pragma: {e}")))?;

        let storage = Self::init(conn)?;
        info!("queue database opened");
        Ok(storage)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PrintloopError::Database(format!("open in-memory: {e}")))?;
        let storage = Self::init(conn)?;
        debug!("in-memory queue database opened");
        Ok(storage)
    }

    fn init(conn: Connection) -> Result<Self> {
        // ON DELETE CASCADE only works with foreign keys enabled per connection.
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| PrintloopError::Database(format!("foreign_keys pragma: {e}")))?;

        let mut storage = Self { conn };
        if storage.has_table("storage_details")? {
            storage.check_schema()?;
        } else {
            storage.create_schema()?;
        }
        Ok(storage)
    }

    fn has_table(&self, name: &str) -> Result<bool> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(n > 0)
    }

    fn create_schema(&mut self) -> Result<()> {
        info!("queue database needs init");
        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| PrintloopError::Database(format!("create tables: {e}")))?;
        tx.execute(
            "INSERT INTO storage_details (schema_version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )
        .map_err(db_err)?;
        let now = Utc::now().to_rfc3339();
        for (name, rank) in [(DEFAULT_QUEUE, 0.0), (ARCHIVE_QUEUE, -1.0)] {
            tx.execute(
                "INSERT INTO queues (name, created, rank, addr, strategy)
                 VALUES (?1, ?2, ?3, NULL, ?4)",
                params![name, now, rank, Strategy::InOrder.as_str()],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    fn check_schema(&self) -> Result<()> {
        let found = self.schema_version()?;
        info!(schema_version = %found, "storage schema version");
        if found != SCHEMA_VERSION {
            return Err(PrintloopError::SchemaMismatch {
                expected: SCHEMA_VERSION.into(),
                found,
            });
        }
        Ok(())
    }

    /// Schema version recorded in the database, or `"none"` if missing.
    pub fn schema_version(&self) -> Result<String> {
        let v: Option<String> = self
            .conn
            .query_row("SELECT schema_version FROM storage_details LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?;
        Ok(v.unwrap_or_else(|| "none".into()))
    }

    // -- Queues --------------------------------------------------------------

    /// Insert a new queue. Names are unique.
    #[instrument(skip(self, queue), fields(queue = %queue.name))]
    pub fn add_queue(&self, queue: &Queue) -> Result<()> {
        if self.queue(&queue.name)?.is_some() {
            return Err(PrintloopError::DuplicateQueue(queue.name.clone()));
        }
        self.conn
            .execute(
                "INSERT INTO queues (name, created, rank, addr, strategy)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    queue.name,
                    queue.created.to_rfc3339(),
                    queue.rank,
                    queue.addr,
                    queue.strategy.as_str(),
                ],
            )
            .map_err(|e| PrintloopError::Database(format!("insert queue: {e}")))?;
        info!(queue = %queue.name, "queue added");
        Ok(())
    }

    /// Delete a queue and, by cascade, its jobs, sets, and runs.
    ///
    /// Returns whether a queue was removed.
    #[instrument(skip(self))]
    pub fn remove_queue(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM queues WHERE name = ?1", params![name])
            .map_err(|e| PrintloopError::Database(format!("delete queue: {e}")))?;
        if rows > 0 {
            info!(queue = name, "queue removed");
        }
        Ok(rows > 0)
    }

    pub fn queue(&self, name: &str) -> Result<Option<Queue>> {
        self.conn
            .query_row(
                "SELECT name, created, rank, addr, strategy FROM queues WHERE name = ?1",
                params![name],
                row_to_queue,
            )
            .optional()
            .map_err(db_err)
    }

    /// All queues, lowest rank first.
    pub fn queues(&self) -> Result<Vec<Queue>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, created, rank, addr, strategy FROM queues
                 ORDER BY rank ASC, name ASC",
            )
            .map_err(|e| PrintloopError::Database(format!("prepare queues: {e}")))?;
        let queues = stmt
            .query_map([], row_to_queue)
            .map_err(|e| PrintloopError::Database(format!("query queues: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PrintloopError::Database(format!("collect rows: {e}")))?;
        Ok(queues)
    }

    // -- Jobs ----------------------------------------------------------------

    /// Insert a job and its sets. Returns the job with row ids filled in.
    #[instrument(skip(self, job), fields(queue = %job.queue, name = %job.name))]
    pub fn insert_job(&mut self, job: &Job) -> Result<Job> {
        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO jobs (queue, name, draft, rank, count, remaining, created, acquired)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.queue,
                job.name,
                job.draft,
                job.rank,
                job.count,
                job.remaining,
                job.created.to_rfc3339(),
                job.acquired,
            ],
        )
        .map_err(|e| PrintloopError::Database(format!("insert job: {e}")))?;
        let mut saved = job.clone();
        saved.id = JobId(tx.last_insert_rowid());

        for set in &mut saved.sets {
            set.job_id = saved.id;
            tx.execute(
                "INSERT INTO sets (job_id, path, sd, rank, count, remaining, material_keys)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    set.job_id.0,
                    set.path,
                    set.sd,
                    set.rank,
                    set.count,
                    set.remaining,
                    set.material_keys(),
                ],
            )
            .map_err(|e| PrintloopError::Database(format!("insert set: {e}")))?;
            set.id = SetId(tx.last_insert_rowid());
        }
        tx.commit().map_err(db_err)?;

        info!(job_id = %saved.id, sets = saved.sets.len(), "job inserted");
        Ok(saved)
    }

    /// Insert one set into an existing job.
    #[instrument(skip(self, set), fields(path = %set.path))]
    pub fn insert_set(&self, job_id: JobId, set: &PrintSet) -> Result<PrintSet> {
        self.conn
            .execute(
                "INSERT INTO sets (job_id, path, sd, rank, count, remaining, material_keys)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job_id.0,
                    set.path,
                    set.sd,
                    set.rank,
                    set.count,
                    set.remaining,
                    set.material_keys(),
                ],
            )
            .map_err(|e| PrintloopError::Database(format!("insert set: {e}")))?;
        let mut saved = set.clone();
        saved.id = SetId(self.conn.last_insert_rowid());
        saved.job_id = job_id;
        Ok(saved)
    }

    /// Write back every mutable field of a job and its sets.
    ///
    /// Runs in one transaction so readers never observe a set decremented
    /// without the matching job decrement.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn save_job(&mut self, job: &Job) -> Result<()> {
        let tx = self.conn.transaction().map_err(db_err)?;
        write_job(&tx, job)?;
        tx.commit().map_err(db_err)?;
        debug!(remaining = job.remaining, "job saved");
        Ok(())
    }

    /// Move a set to another job and/or rank.
    pub fn move_set(&self, set_id: SetId, job_id: JobId, rank: f64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE sets SET job_id = ?1, rank = ?2 WHERE id = ?3",
                params![job_id.0, rank, set_id.0],
            )
            .map_err(|e| PrintloopError::Database(format!("move set: {e}")))?;
        if rows == 0 {
            return Err(PrintloopError::NotFound(format!("set {set_id}")));
        }
        Ok(())
    }

    /// Retrieve a job with its sets. Returns `None` if it does not exist.
    pub fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.0],
                row_to_job,
            )
            .optional()
            .map_err(db_err)?;
        match job {
            Some(mut job) => {
                job.sets = self.sets_of(job.id)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Jobs of a queue with their sets, in scheduling order.
    #[instrument(skip(self))]
    pub fn jobs_in_queue(&self, queue: &str) -> Result<Vec<Job>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE queue = ?1 ORDER BY rank ASC, id ASC"
            ))
            .map_err(|e| PrintloopError::Database(format!("prepare jobs_in_queue: {e}")))?;
        let mut jobs = stmt
            .query_map(params![queue], row_to_job)
            .map_err(|e| PrintloopError::Database(format!("query jobs_in_queue: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PrintloopError::Database(format!("collect rows: {e}")))?;
        for job in &mut jobs {
            job.sets = self.sets_of(job.id)?;
        }
        debug!(count = jobs.len(), "retrieved jobs");
        Ok(jobs)
    }

    /// The job a previous process was working on, if any.
    pub fn acquired_job(&self) -> Result<Option<Job>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM jobs WHERE acquired = 1 ORDER BY rank ASC, id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match id {
            Some(id) => self.get_job(JobId(id)),
            None => Ok(None),
        }
    }

    /// Highest job rank in a queue plus one, for appending.
    pub fn next_job_rank(&self, queue: &str) -> Result<f64> {
        let max: Option<f64> = self
            .conn
            .query_row("SELECT max(rank) FROM jobs WHERE queue = ?1", params![queue], |row| {
                row.get(0)
            })
            .map_err(db_err)?;
        Ok(max.map_or(0.0, |r| r + 1.0))
    }

    /// Highest set rank in a job plus one, for appending.
    pub fn next_set_rank(&self, job_id: JobId) -> Result<f64> {
        let max: Option<f64> = self
            .conn
            .query_row("SELECT max(rank) FROM sets WHERE job_id = ?1", params![job_id.0], |row| {
                row.get(0)
            })
            .map_err(db_err)?;
        Ok(max.map_or(0.0, |r| r + 1.0))
    }

    fn sets_of(&self, job_id: JobId) -> Result<Vec<PrintSet>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SET_COLUMNS} FROM sets WHERE job_id = ?1 ORDER BY rank ASC, id ASC"
            ))
            .map_err(|e| PrintloopError::Database(format!("prepare sets: {e}")))?;
        let sets = stmt
            .query_map(params![job_id.0], row_to_set)
            .map_err(|e| PrintloopError::Database(format!("query sets: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PrintloopError::Database(format!("collect rows: {e}")))?;
        Ok(sets)
    }

    /// Retrieve a single set.
    pub fn get_set(&self, id: SetId) -> Result<Option<PrintSet>> {
        self.conn
            .query_row(
                &format!("SELECT {SET_COLUMNS} FROM sets WHERE id = ?1"),
                params![id.0],
                row_to_set,
            )
            .optional()
            .map_err(db_err)
    }

    /// Delete jobs (cascading to their sets and runs) and individual sets.
    ///
    /// Missing ids are ignored. Returns the number of jobs and sets removed.
    #[instrument(skip(self))]
    pub fn remove(&mut self, job_ids: &[JobId], set_ids: &[SetId]) -> Result<(usize, usize)> {
        let tx = self.conn.transaction().map_err(db_err)?;
        let mut jobs = 0;
        for id in job_ids {
            jobs += tx
                .execute("DELETE FROM jobs WHERE id = ?1", params![id.0])
                .map_err(|e| PrintloopError::Database(format!("delete job: {e}")))?;
        }
        let mut sets = 0;
        for id in set_ids {
            sets += tx
                .execute("DELETE FROM sets WHERE id = ?1", params![id.0])
                .map_err(|e| PrintloopError::Database(format!("delete set: {e}")))?;
        }
        tx.commit().map_err(db_err)?;
        info!(jobs, sets, "removed from queue");
        Ok((jobs, sets))
    }

    // -- Runs ----------------------------------------------------------------

    /// Open a run record for `path` of `job`.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn begin_run(&self, queue_name: &str, job: &Job, path: &str) -> Result<Run> {
        let start = Utc::now();
        self.conn
            .execute(
                "INSERT INTO runs (queue_name, job_name, job_id, path, started, ended, result)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL)",
                params![queue_name, job.name, job.id.0, path, start.to_rfc3339()],
            )
            .map_err(|e| PrintloopError::Database(format!("insert run: {e}")))?;
        let run = Run {
            id: RunId(self.conn.last_insert_rowid()),
            queue_name: queue_name.to_string(),
            job_name: job.name.clone(),
            job_id: job.id,
            path: path.to_string(),
            start,
            end: None,
            result: None,
        };
        info!(run_id = %run.id, "run started");
        Ok(run)
    }

    /// Close an open run. Closing an already-closed run changes nothing.
    #[instrument(skip(self))]
    pub fn end_run(&self, run_id: RunId, result: RunResult) -> Result<Option<Run>> {
        close_run(&self.conn, run_id, result)?;
        self.get_run(run_id)
    }

    /// Close a run and write back the job it was accounted against, in one
    /// transaction. On error neither change is visible.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn finish_run(&mut self, run_id: RunId, result: RunResult, job: &Job) -> Result<()> {
        let tx = self.conn.transaction().map_err(db_err)?;
        close_run(&tx, run_id, result)?;
        write_job(&tx, job)?;
        tx.commit().map_err(db_err)?;
        debug!(remaining = job.remaining, "run finished and job saved");
        Ok(())
    }

    pub fn get_run(&self, run_id: RunId) -> Result<Option<Run>> {
        self.conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![run_id.0],
                row_to_run,
            )
            .optional()
            .map_err(db_err)
    }

    /// Most recent still-open run for a queue/job/path, used to resume after
    /// a restart mid-print.
    pub fn active_run(&self, queue_name: &str, job_id: JobId, path: &str) -> Result<Option<Run>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM runs
                     WHERE queue_name = ?1 AND job_id = ?2 AND path = ?3 AND ended IS NULL
                     ORDER BY started DESC, id DESC LIMIT 1"
                ),
                params![queue_name, job_id.0, path],
                row_to_run,
            )
            .optional()
            .map_err(db_err)
    }

    /// All runs, newest first.
    #[instrument(skip(self))]
    pub fn history(&self) -> Result<Vec<Run>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY started DESC, id DESC"))
            .map_err(|e| PrintloopError::Database(format!("prepare history: {e}")))?;
        let runs = stmt
            .query_map([], row_to_run)
            .map_err(|e| PrintloopError::Database(format!("query history: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PrintloopError::Database(format!("collect rows: {e}")))?;
        debug!(count = runs.len(), "retrieved run history");
        Ok(runs)
    }

    /// Delete every closed run. Open runs stay so they can still be ended.
    pub fn clear_history(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute("DELETE FROM runs WHERE ended IS NOT NULL", [])
            .map_err(|e| PrintloopError::Database(format!("clear history: {e}")))?;
        info!(rows, "run history cleared");
        Ok(rows)
    }

    /// Raw connection access for tests that poke at constraints directly.
    #[cfg(test)]
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ---------------------------------------------------------------------------
// Shared writes
// ---------------------------------------------------------------------------

/// Update a job row and all of its set rows. Callers own the transaction.
fn write_job(conn: &Connection, job: &Job) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE jobs SET queue = ?1, name = ?2, draft = ?3, rank = ?4, count = ?5,
             remaining = ?6, acquired = ?7 WHERE id = ?8",
            params![
                job.queue,
                job.name,
                job.draft,
                job.rank,
                job.count,
                job.remaining,
                job.acquired,
                job.id.0,
            ],
        )
        .map_err(|e| PrintloopError::Database(format!("update job: {e}")))?;
    if rows == 0 {
        return Err(PrintloopError::NotFound(format!("job {}", job.id)));
    }
    for set in &job.sets {
        conn.execute(
            "UPDATE sets SET job_id = ?1, path = ?2, sd = ?3, rank = ?4, count = ?5,
             remaining = ?6, material_keys = ?7 WHERE id = ?8",
            params![
                job.id.0,
                set.path,
                set.sd,
                set.rank,
                set.count,
                set.remaining,
                set.material_keys(),
                set.id.0,
            ],
        )
        .map_err(|e| PrintloopError::Database(format!("update set: {e}")))?;
    }
    Ok(())
}

/// Set `ended` and `result` on a run that is still open. Returns whether a
/// row changed.
fn close_run(conn: &Connection, run_id: RunId, result: RunResult) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE runs SET ended = ?1, result = ?2 WHERE id = ?3 AND ended IS NULL",
            params![Utc::now().to_rfc3339(), result.as_str(), run_id.0],
        )
        .map_err(|e| PrintloopError::Database(format!("end run: {e}")))?;
    if rows == 0 {
        warn!(%run_id, "run already closed or missing");
    } else {
        info!(%run_id, %result, "run ended");
    }
    Ok(rows > 0)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_time(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn row_to_queue(row: &rusqlite::Row<'_>) -> rusqlite::Result<Queue> {
    let created: String = row.get(1)?;
    let strategy: String = row.get(4)?;
    Ok(Queue {
        name: row.get(0)?,
        created: parse_time(1, &created)?,
        rank: row.get(2)?,
        addr: row.get(3)?,
        strategy: strategy.parse().map_err(|e| conversion_err(4, e))?,
    })
}

/// Map a job row (columns in `JOB_COLUMNS` order). Sets are loaded separately.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let created: String = row.get(7)?;
    Ok(Job {
        id: JobId(row.get(0)?),
        queue: row.get(1)?,
        name: row.get(2)?,
        draft: row.get(3)?,
        rank: row.get(4)?,
        count: row.get(5)?,
        remaining: row.get(6)?,
        created: parse_time(7, &created)?,
        acquired: row.get(8)?,
        sets: Vec::new(),
    })
}

fn row_to_set(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrintSet> {
    let keys: String = row.get(7)?;
    Ok(PrintSet {
        id: SetId(row.get(0)?),
        job_id: JobId(row.get(1)?),
        path: row.get(2)?,
        sd: row.get(3)?,
        rank: row.get(4)?,
        count: row.get(5)?,
        remaining: row.get(6)?,
        materials: PrintSet::parse_material_keys(&keys),
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let started: String = row.get(5)?;
    let ended: Option<String> = row.get(6)?;
    let result: Option<String> = row.get(7)?;
    Ok(Run {
        id: RunId(row.get(0)?),
        queue_name: row.get(1)?,
        job_name: row.get(2)?,
        job_id: JobId(row.get(3)?),
        path: row.get(4)?,
        start: parse_time(5, &started)?,
        end: ended.as_deref().map(|s| parse_time(6, s)).transpose()?,
        result: result
            .as_deref()
            .map(|s| s.parse::<RunResult>().map_err(|e| conversion_err(7, e)))
            .transpose()?,
    })
}
