#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use recon_jobs_rs::launcher::{Launcher, ToolCommand};
use recon_jobs_rs::registry::{JobStore, MemoryJobStore, OutputLayout};
use recon_jobs_rs::server::{router, AppState};
use tempfile::TempDir;

/// A stand-in scanner: `sh -c <script>` sees the scan arguments as
/// `$1=-d $2=<target> $3=<-r|-a> $4=-o $5=<output dir>`.
pub fn fake_tool(script: &str) -> ToolCommand {
    ToolCommand::new("sh").with_leading_args(["-c", script, "recon-tool"])
}

pub struct Harness {
    pub root: TempDir,
    pub launcher: Launcher,
}

impl Harness {
    pub fn new(tool: ToolCommand) -> Self {
        let root = tempfile::tempdir().expect("create output root");
        let layout = OutputLayout::prepare(root.path()).expect("prepare layout");
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let launcher = Launcher::new(store, layout, tool);
        Self { root, launcher }
    }

    pub fn with_script(script: &str) -> Self {
        Self::new(fake_tool(script))
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        self.launcher.store()
    }

    pub fn app(&self) -> Router {
        router(AppState::new(self.launcher.clone()), None)
    }

    /// Wait (bounded) for every submitted scan to be recorded.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(20), self.launcher.wait_idle())
            .await
            .expect("scans did not finish in time");
    }
}
