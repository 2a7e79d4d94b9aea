//! Async job table
//!
//! SQLite-backed persistence for [`AsyncJob`] rows. Each row holds the job as a single
//! JSON document. Status changes are conditional updates on the current status, so two
//! workers polling the same table can never both claim a job.

use crate::types::job::{AsyncJob, JobStatus, ObjectLocator};
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

const MIGRATION: &str = include_str!("../../migrations/001_inf_jobs.sql");

/// Job table errors
#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Corrupt job record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, JobStoreError>;

/// Connection pool over the job table
#[derive(Clone)]
pub struct JobStore {
    pool: Pool<SqliteConnectionManager>,
}

impl JobStore {
    /// Open (creating if needed) the database at `database_path`
    pub fn open(database_path: &str) -> Result<Self> {
        tracing::info!(path = %database_path, "Opening job database");

        let is_memory = database_path == ":memory:" || database_path.contains("mode=memory");
        if !is_memory {
            if let Some(parent) = std::path::Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        JobStoreError::Config(format!("Failed to create database directory: {}", e))
                    })?;
                }
            }
        }

        // All pooled connections must see the same in-memory database
        let connection_string = if database_path == ":memory:" {
            "file::memory:?cache=shared"
        } else {
            database_path
        };

        let manager = SqliteConnectionManager::file(connection_string).with_init(move |conn| {
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            if !is_memory {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(())
        });

        let pool = Pool::builder().max_size(8).build(manager)?;
        Ok(Self { pool })
    }

    /// Create the job table and indexes
    pub fn migrate(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(MIGRATION)?;
        tracing::debug!("Job table migrations applied");
        Ok(())
    }

    /// Persist a new job
    pub fn insert(&self, job: &AsyncJob) -> Result<usize> {
        let conn = self.pool.get()?;
        let data = serde_json::to_string(job)?;
        let count = conn.execute("INSERT INTO inf_jobs (data) VALUES (?1)", params![data])?;
        tracing::info!(job_id = %job.job_id, "Job record inserted");
        Ok(count)
    }

    /// Look up a job by id
    pub fn get(&self, job_id: &str) -> Result<Option<AsyncJob>> {
        let conn = self.pool.get()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM inf_jobs WHERE json_extract(data, '$.job_id') = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(JobStoreError::from))
            .transpose()
    }

    /// Claim the oldest ACCEPTED job, moving it to PROCESSING
    pub fn claim_next(&self) -> Result<Option<AsyncJob>> {
        let conn = self.pool.get()?;
        loop {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, data FROM inf_jobs
                     WHERE json_extract(data, '$.status') = ?1
                     ORDER BY id LIMIT 1",
                    params![JobStatus::Accepted.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((id, data)) = row else {
                return Ok(None);
            };

            let mut job: AsyncJob = serde_json::from_str(&data)?;
            job.status = JobStatus::Processing;
            job.updated_time = Some(Utc::now());
            if compare_and_swap(&conn, id, JobStatus::Accepted, &job)? {
                tracing::info!(job_id = %job.job_id, "Job claimed");
                return Ok(Some(job));
            }
            // Another worker won the race for this row; try the next one.
            tracing::debug!(job_id = %job.job_id, "Job claimed by another worker");
        }
    }

    /// PROCESSING -> COMPLETED, recording where the results were written
    pub fn complete(&self, job_id: &str, output: &ObjectLocator) -> Result<Option<AsyncJob>> {
        self.transition(job_id, JobStatus::Processing, JobStatus::Completed, |job| {
            job.output_locator = Some(output.clone());
            job.error = None;
        })
    }

    /// PROCESSING -> FAILED, recording the reason
    pub fn fail(&self, job_id: &str, reason: &str) -> Result<Option<AsyncJob>> {
        self.transition(job_id, JobStatus::Processing, JobStatus::Failed, |job| {
            job.error = Some(reason.to_string());
        })
    }

    /// Apply a forward transition; `None` when the job is missing or not in `from`
    fn transition<F>(&self, job_id: &str, from: JobStatus, to: JobStatus, apply: F) -> Result<Option<AsyncJob>>
    where
        F: FnOnce(&mut AsyncJob),
    {
        if !from.can_transition_to(to) {
            return Ok(None);
        }
        let conn = self.pool.get()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, data FROM inf_jobs WHERE json_extract(data, '$.job_id') = ?1",
                params![job_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((id, data)) = row else {
            return Ok(None);
        };

        let mut job: AsyncJob = serde_json::from_str(&data)?;
        if job.status != from {
            tracing::warn!(job_id = %job_id, current = %job.status, target = %to, "Rejected job transition");
            return Ok(None);
        }
        job.status = to;
        job.updated_time = Some(Utc::now());
        apply(&mut job);

        if compare_and_swap(&conn, id, from, &job)? {
            tracing::info!(job_id = %job_id, status = %to, "Job status updated");
            Ok(Some(job))
        } else {
            Ok(None)
        }
    }
}

fn compare_and_swap(
    conn: &rusqlite::Connection,
    id: i64,
    expected: JobStatus,
    job: &AsyncJob,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE inf_jobs SET data = ?1
         WHERE id = ?2 AND json_extract(data, '$.status') = ?3",
        params![serde_json::to_string(job)?, id, expected.as_str()],
    )?;
    Ok(affected == 1)
}

#[cfg(test)]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(test)]
static TEST_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create a unique in-memory job store for testing
#[cfg(test)]
pub(crate) fn create_test_store() -> JobStore {
    let id = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_name = format!("file:jobsdb{}?mode=memory&cache=shared", id);
    let store = JobStore::open(&db_name).expect("Failed to create test database");
    store.migrate().expect("Failed to run migrations");
    store
}
