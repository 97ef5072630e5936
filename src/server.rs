use std::path::Path as FsPath;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Request, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    artifacts,
    config::Config,
    error::ScanError,
    launcher::Launcher,
    registry::{JobStore, MemoryJobStore, OutputLayout},
    types::{JobDetail, JobId, JobSummary},
};

#[derive(Clone)]
pub struct AppState {
    launcher: Launcher,
}

impl AppState {
    pub fn new(launcher: Launcher) -> Self {
        Self { launcher }
    }

    fn store(&self) -> &Arc<dyn JobStore> {
        self.launcher.store()
    }
}

/// Body of `POST /scan`. Both fields are optional here so that a missing
/// field is reported as a 400 with a message rather than a bare rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub scan_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanAccepted {
    pub message: String,
    pub scan_id: JobId,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ScanError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ScanError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            other => {
                error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("An internal error occurred"),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the HTTP surface. Paths the API does not handle fall through to the
/// static UI directory when one is given.
pub fn router(state: AppState, ui_dir: Option<&FsPath>) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/scans", get(list_scans))
        .route("/scans/{scan_id}", get(get_scan))
        .route("/results/{scan_id}/images/{*path}", get(get_artifact))
        .with_state(state);

    let app = match ui_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the scan API until `shutdown` is cancelled.
///
/// Scans still running at shutdown are left to finish on their own; their
/// outcome is not recorded since the registry lives in this process.
pub async fn spawn_server(config: &Config, shutdown: CancellationToken) -> Result<()> {
    let layout = OutputLayout::prepare(&config.output_root).with_context(|| {
        format!(
            "failed to prepare output root: {}",
            config.output_root.display()
        )
    })?;
    info!(output_root = %layout.root().display(), "scan output root ready");

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let launcher = Launcher::new(store, layout, config.tool_command());
    let app = router(AppState::new(launcher.clone()), config.ui_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %listener.local_addr()?, "serving scan API");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    let running = launcher.in_flight();
    if running > 0 {
        warn!(running, "stopping with scans still running");
    }
    Ok(())
}

async fn post_scan(
    State(app): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<ScanAccepted>, ScanError> {
    let Json(req) = payload.map_err(|e| ScanError::InvalidInput(e.body_text()))?;
    let scan_id = app.launcher.submit(
        req.target.as_deref().unwrap_or_default(),
        req.scan_type.as_deref().unwrap_or_default(),
    )?;
    Ok(Json(ScanAccepted {
        message: String::from("Scan started successfully"),
        scan_id,
    }))
}

async fn list_scans(State(app): State<AppState>) -> Json<Vec<JobSummary>> {
    let jobs = app.store().list();
    Json(jobs.iter().map(JobSummary::from).collect())
}

async fn get_scan(
    State(app): State<AppState>,
    scan_id: Result<Path<String>, PathRejection>,
) -> Result<Json<JobDetail>, ScanError> {
    let Path(scan_id) = scan_id.map_err(|_| scan_not_found())?;
    let job = parse_id(&scan_id)
        .and_then(|id| app.store().find(id))
        .ok_or_else(scan_not_found)?;

    let artifacts = if job.status.is_terminal() {
        let dir = job.output_dir.clone();
        tokio::task::spawn_blocking(move || artifacts::list_artifacts(&dir))
            .await
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(Json(JobDetail {
        summary: JobSummary::from(&job),
        folder_bytes: job.artifact_size.bytes,
        artifacts,
    }))
}

async fn get_artifact(
    State(app): State<AppState>,
    params: Result<Path<(String, String)>, PathRejection>,
    req: Request,
) -> Result<Response, ScanError> {
    // Undecodable segments are answered like any other missing file.
    let Path((scan_id, path)) = params.map_err(|_| artifacts::file_not_found())?;
    let id = parse_id(&scan_id).ok_or_else(scan_not_found)?;
    let file = artifacts::resolve(app.store().as_ref(), id, &path)?;

    match ServeFile::new(file).oneshot(req).await {
        Ok(res) => Ok(res.into_response()),
        Err(never) => match never {},
    }
}

fn parse_id(raw: &str) -> Option<JobId> {
    raw.parse().ok()
}

fn scan_not_found() -> ScanError {
    ScanError::NotFound(String::from("Scan not found"))
}
