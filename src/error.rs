use std::io;
use std::path::PathBuf;

/// Errors produced by the job orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Missing or malformed target, or an unknown scan mode.
    #[error("{0}")]
    InvalidInput(String),

    /// Unknown job, or an artifact path that is missing or outside the job's directory.
    #[error("{0}")]
    NotFound(String),

    /// The external tool could not be started or exited unsuccessfully.
    #[error("scan tool failed: {0}")]
    ToolFailure(String),

    /// The output directory could not be walked while computing its size.
    #[error("failed to size artifacts in {}: {source}", path.display())]
    ArtifactScan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type ScanResult<T> = Result<T, ScanError>;
