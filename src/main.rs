use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use recon_jobs_rs::{config::Config, logging, server};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::parse();
    logging::init();

    info!(
        bind = %cfg.bind,
        tool = %cfg.tool.display(),
        tool_args = ?cfg.tool_args,
        output_root = %cfg.output_root.display(),
        ui_dir = %cfg
            .ui_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string()),
        "recon-jobs-rs configuration"
    );

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down");
        on_ctrl_c.cancel();
    });

    server::spawn_server(&cfg, shutdown).await
}
