use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::artifacts::dir_size;
use crate::error::{ScanError, ScanResult};
use crate::registry::{JobStore, OutputLayout, UpdateOutcome};
use crate::types::{ArtifactSize, Job, JobId, JobStatus, ScanMode};

/// The external reconnaissance tool.
///
/// Invoked as `program [leading_args..] -d <target> <-r|-a> -o <output dir>`,
/// every value a separate argument; no shell is involved.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, job: &Job) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-d")
            .arg(&job.target)
            .arg(job.mode.tool_flag())
            .arg("-o")
            .arg(&job.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Scans outlive whichever task is waiting on them.
            .kill_on_drop(false);
        cmd
    }
}

/// Accept an IP literal or a DNS hostname. Surrounding whitespace and a
/// trailing root dot are dropped.
pub fn validate_target(raw: &str) -> ScanResult<String> {
    let target = raw.trim();
    if target.is_empty() {
        return Err(ScanError::InvalidInput(String::from("Target is required")));
    }
    if target.parse::<IpAddr>().is_ok() {
        return Ok(target.to_string());
    }
    let host = target.strip_suffix('.').unwrap_or(target);
    if is_hostname(host) {
        Ok(host.to_string())
    } else {
        Err(ScanError::InvalidInput(format!(
            "Target '{target}' is not a hostname or IP address"
        )))
    }
}

fn is_hostname(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// Starts scans in the background and records how they end.
#[derive(Clone)]
pub struct Launcher {
    store: Arc<dyn JobStore>,
    layout: Arc<OutputLayout>,
    tool: Arc<ToolCommand>,
    tasks: TaskTracker,
}

impl Launcher {
    pub fn new(store: Arc<dyn JobStore>, layout: OutputLayout, tool: ToolCommand) -> Self {
        Self {
            store,
            layout: Arc::new(layout),
            tool: Arc::new(tool),
            tasks: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validate and register a scan, start the tool, and return its id without
    /// waiting for the tool. Must be called from within a Tokio runtime.
    pub fn submit(&self, target: &str, mode: &str) -> ScanResult<JobId> {
        let target = validate_target(target)?;
        let mode: ScanMode = mode.parse()?;

        let job = self.store.create(target, mode, &self.layout);
        info!(
            job_id = job.id,
            target = %job.target,
            mode = %job.mode,
            output_dir = %job.output_dir.display(),
            "scan submitted"
        );

        let id = job.id;
        let store = self.store.clone();
        let tool = self.tool.clone();
        self.tasks.spawn(supervise(store, tool, job));
        Ok(id)
    }

    /// Number of scans whose outcome has not been recorded yet.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every submitted scan has reached a terminal state.
    ///
    /// Closes and reopens the shared tracker, so it is not meant to be called
    /// from several tasks at once.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

async fn supervise(store: Arc<dyn JobStore>, tool: Arc<ToolCommand>, job: Job) {
    let guard = CompletionGuard::new(store, job.id, job.output_dir.clone());

    if let Err(e) = tokio::fs::create_dir_all(&job.output_dir).await {
        warn!(job_id = job.id, error = %e, "could not create output directory");
    }

    let status = match run_tool(&tool, &job).await {
        Ok(()) => JobStatus::Completed,
        Err(e) => {
            warn!(job_id = job.id, target = %job.target, error = %e, "scan failed");
            JobStatus::Failed
        }
    };

    let dir = job.output_dir.clone();
    let bytes = tokio::task::spawn_blocking(move || dir_size(&dir))
        .await
        .unwrap_or(0);
    let size = ArtifactSize::new(bytes);

    if guard.complete(status, size) == UpdateOutcome::Applied {
        info!(job_id = job.id, status = ?status, size = %size, "scan finished");
    }
}

async fn run_tool(tool: &ToolCommand, job: &Job) -> ScanResult<()> {
    let mut child = tool.command(job).spawn().map_err(|e| {
        ScanError::ToolFailure(format!("could not start {}: {e}", tool.program.display()))
    })?;
    info!(job_id = job.id, pid = child.id(), "scan tool started");

    let status = child
        .wait()
        .await
        .map_err(|e| ScanError::ToolFailure(format!("lost track of tool process: {e}")))?;
    if status.success() {
        return Ok(());
    }
    Err(ScanError::ToolFailure(match status.code() {
        Some(code) => format!("exit code {code}"),
        None => String::from("terminated by signal"),
    }))
}

/// Records a job's terminal state exactly once. Dropping it unfired (the
/// supervising task panicked or was torn down) marks the job failed.
struct CompletionGuard {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    output_dir: PathBuf,
    fired: bool,
}

impl CompletionGuard {
    fn new(store: Arc<dyn JobStore>, job_id: JobId, output_dir: PathBuf) -> Self {
        Self {
            store,
            job_id,
            output_dir,
            fired: false,
        }
    }

    fn complete(mut self, status: JobStatus, size: ArtifactSize) -> UpdateOutcome {
        self.fired = true;
        self.store.update(self.job_id, status, size)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.fired {
            return;
        }
        warn!(job_id = self.job_id, "scan supervisor ended without an outcome; marking failed");
        let size = ArtifactSize::new(dir_size(&self.output_dir));
        self.store.update(self.job_id, JobStatus::Failed, size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryJobStore;

    #[test]
    fn accepts_hosts_and_ips() {
        assert_eq!(validate_target("example.com").unwrap(), "example.com");
        assert_eq!(validate_target("  sub.example.com.  ").unwrap(), "sub.example.com");
        assert_eq!(validate_target("10.0.0.1").unwrap(), "10.0.0.1");
        assert_eq!(validate_target("::1").unwrap(), "::1");
        assert_eq!(validate_target("x").unwrap(), "x");
    }

    #[test]
    fn rejects_empty_and_shell_shaped_targets() {
        for bad in [
            "",
            "   ",
            "example.com; rm -rf /",
            "$(id)",
            "a b",
            "-d",
            "../etc",
            "exa_mple.com",
            "a..b",
        ] {
            assert!(
                matches!(validate_target(bad), Err(ScanError::InvalidInput(_))),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn command_passes_discrete_arguments() {
        let job = Job {
            id: 1,
            target: "example.com".into(),
            mode: ScanMode::Full,
            submitted_at: time::OffsetDateTime::UNIX_EPOCH,
            status: JobStatus::Running,
            output_dir: PathBuf::from("/srv/recon/example.com_x"),
            artifact_size: ArtifactSize::ZERO,
        };
        let tool = ToolCommand::new("./reconftw.sh").with_leading_args(["--quiet"]);
        let cmd = tool.command(&job);
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["--quiet", "-d", "example.com", "-a", "-o", "/srv/recon/example.com_x"]
        );
    }

    #[test]
    fn dropped_guard_marks_failed() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::prepare(tmp.path()).unwrap();
        let job = store.create("example.com".into(), ScanMode::Recon, &layout);
        drop(CompletionGuard::new(store.clone(), job.id, job.output_dir.clone()));
        let job = store.find(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.artifact_size, ArtifactSize::ZERO);
    }

    #[test]
    fn fired_guard_does_not_update_twice() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::prepare(tmp.path()).unwrap();
        let job = store.create("example.com".into(), ScanMode::Recon, &layout);
        let guard = CompletionGuard::new(store.clone(), job.id, job.output_dir.clone());
        assert_eq!(
            guard.complete(JobStatus::Completed, ArtifactSize::new(3)),
            UpdateOutcome::Applied
        );
        assert_eq!(store.find(job.id).unwrap().status, JobStatus::Completed);
    }
}
