//! Job registry: the single source of truth for job state.
//!
//! [`JobStore`] is the storage seam; [`MemoryJobStore`] keeps everything in
//! process memory and is never pruned, so it grows with every submission.
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use time::{macros::format_description, Duration, OffsetDateTime};
use tracing::warn;

use crate::types::{ArtifactSize, Job, JobId, JobStatus, ScanMode};

/// Result of applying a terminal update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The job had already reached a terminal state; nothing changed.
    AlreadyTerminal,
    Missing,
}

/// Storage contract for job records.
pub trait JobStore: Send + Sync {
    /// Allocate the next id and submission time, register the job as `running`.
    fn create(&self, target: String, mode: ScanMode, layout: &OutputLayout) -> Job;

    fn find(&self, id: JobId) -> Option<Job>;

    /// Owned snapshot of every job, newest submission first.
    fn list(&self) -> Vec<Job>;

    /// Move a running job to its terminal state. Applied at most once per job.
    fn update(&self, id: JobId, status: JobStatus, size: ArtifactSize) -> UpdateOutcome;
}

/// Where job output directories live and how they are named.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Create (if needed) and canonicalise the output root.
    pub fn prepare(root: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<target>_<YYYYMMDD>_<HHMMSS>_<micros>`.
    ///
    /// Characters outside `[A-Za-z0-9.-]` in the target become `_` (IPv6 colons, mostly).
    pub fn dir_for(&self, target: &str, submitted_at: OffsetDateTime) -> PathBuf {
        let stamp = submitted_at
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]_[subsecond digits:6]"
            ))
            .unwrap_or_else(|_| submitted_at.unix_timestamp_nanos().to_string());
        let name: String = target
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{name}_{stamp}"))
    }
}

#[derive(Debug, Default)]
struct Inner {
    jobs: BTreeMap<JobId, Job>,
    last_id: JobId,
    last_submitted: Option<OffsetDateTime>,
}

/// In-memory [`JobStore`] guarded by a single lock.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, target: String, mode: ScanMode, layout: &OutputLayout) -> Job {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        // Microsecond resolution matches the directory stamp; a clock tie or a
        // step backwards is pushed past the previous submission.
        let now = OffsetDateTime::now_utc();
        let now = now
            .replace_nanosecond(now.nanosecond() / 1_000 * 1_000)
            .unwrap_or(now);
        let submitted_at = match inner.last_submitted {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };

        inner.last_id += 1;
        inner.last_submitted = Some(submitted_at);
        let job = Job {
            id: inner.last_id,
            output_dir: layout.dir_for(&target, submitted_at),
            target,
            mode,
            submitted_at,
            status: JobStatus::Running,
            artifact_size: ArtifactSize::ZERO,
        };
        inner.jobs.insert(job.id, job.clone());
        job
    }

    fn find(&self, id: JobId) -> Option<Job> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.jobs.get(&id).cloned()
    }

    fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            inner.jobs.values().cloned().collect()
        };
        jobs.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        jobs
    }

    fn update(&self, id: JobId, status: JobStatus, size: ArtifactSize) -> UpdateOutcome {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(job) = inner.jobs.get_mut(&id) else {
            warn!(job_id = id, "status update for unknown job ignored");
            return UpdateOutcome::Missing;
        };
        if job.status.is_terminal() {
            warn!(
                job_id = id,
                current = ?job.status,
                requested = ?status,
                "job already terminal; update ignored"
            );
            return UpdateOutcome::AlreadyTerminal;
        }
        job.status = status;
        job.artifact_size = size;
        UpdateOutcome::Applied
    }
}
