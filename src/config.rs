use std::path::PathBuf;

use clap::Parser;

use crate::launcher::ToolCommand;

/// recon-jobs-rs: submit recon scans, track them, and browse their artifacts over HTTP.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "recon-jobs-rs",
    version,
    about = "Launch recon scans in the background and serve their results over HTTP.",
    long_about = None
)]
pub struct Config {
    /// Address the HTTP API listens on.
    #[arg(long, env = "RECON_BIND", default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Scanner executable, invoked as `<tool> -d <target> -r|-a -o <dir>`.
    #[arg(long, env = "RECON_TOOL", default_value = "./reconftw.sh")]
    pub tool: PathBuf,

    /// Extra argument placed before the scan arguments (repeatable, or comma-separated).
    #[arg(
        long = "tool-arg",
        env = "RECON_TOOL_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true
    )]
    pub tool_args: Vec<String>,

    /// Directory under which each scan gets its own output directory.
    #[arg(long = "output-root", env = "RECON_OUTPUT_ROOT", default_value = "Recon")]
    pub output_root: PathBuf,

    /// Static UI directory served for any path the API does not handle.
    #[arg(long = "ui-dir", env = "RECON_UI_DIR")]
    pub ui_dir: Option<PathBuf>,
}

impl Config {
    pub fn tool_command(&self) -> ToolCommand {
        ToolCommand::new(&self.tool).with_leading_args(self.tool_args.iter().cloned())
    }
}
