use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use class_scraper::HistoryStore;
use class_scraper::types::ClassRecord;
use serde::Serialize;
use serde_json::json;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_FILE: &str = "class-data.json";
const SCRAPER_BIN_NAME: &str = "class-scraper";

/// Settings read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub data_file: PathBuf,
    pub scraper_bin: PathBuf,
}

impl ServerConfig {
    /// Reads `PORT`, `CLASS_DATA_FILE` and `SCRAPER_BIN`.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(port) => port
                .parse()
                .with_context(|| format!("Invalid PORT value: {port}"))?,
            Err(_) => DEFAULT_PORT,
        };

        let data_file = std::env::var("CLASS_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_FILE));

        let scraper_bin = std::env::var("SCRAPER_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_scraper_bin());

        Ok(Self {
            port,
            data_file,
            scraper_bin,
        })
    }
}

/// The scraper binary installed next to this one, else whatever is on `PATH`.
fn default_scraper_bin() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(SCRAPER_BIN_NAME)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(SCRAPER_BIN_NAME))
}

#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    store: HistoryStore,
    refresh_lock: Arc<Mutex<()>>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Self {
        Self {
            store: HistoryStore::new(&config.data_file),
            config: Arc::new(config),
            refresh_lock: Arc::new(Mutex::new(())),
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/classes", get(get_classes))
        .route("/api/refresh", post(refresh))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassesResponse {
    success: bool,
    last_updated: DateTime<Utc>,
    total_classes: usize,
    classes: Vec<ClassRecord>,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

impl RefreshResponse {
    fn failed(message: impl Into<String>, error: String, output: Option<String>) -> Response {
        let body = RefreshResponse {
            success: false,
            message: message.into(),
            error: Some(error),
            output,
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

async fn get_classes(State(state): State<AppState>) -> Response {
    match state.store.current().await {
        Ok(Some(current)) => Json(ClassesResponse {
            success: true,
            last_updated: current.last_updated,
            total_classes: current.classes.len(),
            classes: current.classes,
        })
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Class data not found" })),
        )
            .into_response(),
        Err(e) => {
            log::error!("Error reading class data: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// Runs the scraper binary to completion. Requests queue behind one another
/// so only one browser session writes the data file at a time.
async fn refresh(State(state): State<AppState>) -> Response {
    let _guard = state.refresh_lock.lock().await;
    let config = &state.config;

    log::info!(
        "Starting class data refresh with {}",
        config.scraper_bin.display()
    );

    let child = Command::new(&config.scraper_bin)
        .arg("--output")
        .arg(&config.data_file)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            log::error!("Failed to start refresh process: {}", e);
            return RefreshResponse::failed("Failed to start refresh process", e.to_string(), None);
        }
    };

    let output = tokio::select! {
        output = child.wait_with_output() => output,
        _ = state.shutdown.cancelled() => {
            log::warn!("Server shutting down, refresh process killed");
            return RefreshResponse::failed(
                "Refresh process cancelled",
                "Server is shutting down".to_string(),
                None,
            );
        }
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            log::error!("Error waiting for refresh process: {}", e);
            return RefreshResponse::failed("Failed to start refresh process", e.to_string(), None);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        log::info!("Class data refresh completed");
        Json(RefreshResponse {
            success: true,
            message: "Class data refresh completed successfully".to_string(),
            error: None,
            output: Some(stdout),
        })
        .into_response()
    } else {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        log::error!("Refresh process failed with exit code {}", code);
        RefreshResponse::failed(
            format!("Refresh process failed with exit code {code}"),
            stderr,
            Some(stdout),
        )
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}
