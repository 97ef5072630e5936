use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{format_description::well_known, OffsetDateTime};

use crate::artifacts::format_size;
use crate::error::ScanError;

/// Identifier of a submitted scan. Allocated from 1 upwards and never reused.
pub type JobId = u64;

/// Which invocation of the external tool a job uses.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Passive/light reconnaissance.
    Recon,
    /// Passive plus active (vulnerability) checks.
    Full,
}

impl ScanMode {
    /// Flag handed to the external tool for this mode.
    pub fn tool_flag(self) -> &'static str {
        match self {
            ScanMode::Recon => "-r",
            ScanMode::Full => "-a",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::Recon => "recon",
            ScanMode::Full => "full",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recon" => Ok(ScanMode::Recon),
            "full" => Ok(ScanMode::Full),
            other => Err(ScanError::InvalidInput(format!(
                "Invalid scan type '{other}' (expected 'recon' or 'full')"
            ))),
        }
    }
}

/// Lifecycle state of a job. `Running` moves to exactly one terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Total byte size of a job's output directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArtifactSize {
    pub bytes: u64,
}

impl ArtifactSize {
    pub const ZERO: ArtifactSize = ArtifactSize { bytes: 0 };

    pub fn new(bytes: u64) -> Self {
        Self { bytes }
    }
}

impl fmt::Display for ArtifactSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.bytes))
    }
}

/// One submitted scan and its tracked lifecycle.
///
/// `artifact_size` is only final once `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub target: String,
    pub mode: ScanMode,
    pub submitted_at: OffsetDateTime,
    pub status: JobStatus,
    pub output_dir: PathBuf,
    pub artifact_size: ArtifactSize,
}

/// Listing row as returned by `GET /scans`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub target: String,
    pub scan_type: ScanMode,
    pub timestamp: String,
    pub status: JobStatus,
    pub folder_size: String,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            target: job.target.clone(),
            scan_type: job.mode,
            timestamp: rfc3339(job.submitted_at),
            status: job.status,
            folder_size: job.artifact_size.to_string(),
        }
    }
}

/// Single-job view: the listing row plus raw size and the artifact paths.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub folder_bytes: u64,
    pub artifacts: Vec<String>,
}

fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
