//! HTTP surface
//!
//! JSON routes for settings, the PE firm registry, upload and batch
//! history/status/report, plus the static web UI as a fallback.

use crate::company::Report;
use crate::config::ServerConfig;
use crate::input::{self, InputError, InputSheet};
use crate::known_firms;
use crate::orchestrator::{BatchTicket, Orchestrator, SubmitError};
use crate::report;
use crate::store::{self, StateStore, StoreError};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub uploads_dir: PathBuf,
    /// Used when the settings file holds no key, e.g. from GEMINI_API_KEY
    pub fallback_api_key: Option<String>,
}

impl AppState {
    fn store(&self) -> &Arc<dyn StateStore> {
        self.orchestrator.store()
    }

    async fn api_key(&self) -> ApiResult<Option<String>> {
        let settings = store::blocking(self.store(), |store| Ok(store.load_settings())).await?;
        Ok(settings
            .api_key()
            .map(str::to_string)
            .or_else(|| self.fallback_api_key.clone().filter(|k| !k.trim().is_empty())))
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!("Storage error: {}", e);
        ApiError::Internal(e.to_string())
    }
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::MissingCredential => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/settings", get(get_settings).post(update_settings))
        .route("/upload", post(upload))
        .route("/history", get(get_history))
        .route("/status/:report_id", get(get_status))
        .route("/pe_firms", get(get_pe_firms).post(update_pe_firms))
        .route("/report/:report_id", get(get_report).delete(delete_report))
        .route("/download/:report_id", get(download_report))
        .fallback_service(ServeDir::new(&server.static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(DefaultBodyLimit::max(server.max_upload_mb * 1024 * 1024)),
        )
        .with_state(state)
}

/// Serve until Ctrl-C, then cancel every running batch.
pub async fn serve(state: AppState, server: &ServerConfig) -> anyhow::Result<()> {
    let tasks = state.orchestrator.tasks().clone();
    let app = create_router(state, server);

    let listener = tokio::net::TcpListener::bind(&server.bind_address).await?;
    info!("Listening on http://{}", server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            let cancelled = tasks.cancel_all();
            info!("Shutting down; cancelled {} running batch(es)", cancelled);
        })
        .await?;
    Ok(())
}

fn parse_report_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound("Report not found".to_string()))
}

async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (settings, firms) =
        store::blocking(state.store(), |store| Ok((store.load_settings(), store.load_known_firms()))).await?;
    // Local tool: the key is returned so the settings form can show it
    let mut settings = serde_json::to_value(settings).map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Value::Object(map) = &mut settings {
        map.insert("pe_firms".to_string(), json!(firms));
    }
    Ok(Json(settings))
}

async fn update_settings(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let Value::Object(body) = body else {
        return Err(ApiError::BadRequest("No settings data provided.".to_string()));
    };

    let api_key = body.get("gemini_api_key").and_then(Value::as_str).map(str::to_string);
    let firms = match body.get("pe_firms") {
        Some(Value::Array(items)) => {
            let names: Vec<String> = items.iter().filter_map(Value::as_str).map(str::to_string).collect();
            Some(known_firms::dedup_ignore_case(&names))
        }
        _ => {
            warn!("PE firms list not provided or in invalid format during settings update. Keeping existing list.");
            None
        }
    };

    store::blocking(state.store(), move |store| {
        let mut settings = store.load_settings();
        settings.gemini_api_key = api_key;
        store.save_settings(&settings)?;
        if let Some(firms) = firms {
            store.save_known_firms(&firms)?;
        }
        Ok(())
    })
    .await?;

    Ok(Json(json!({ "message": "Settings updated successfully!" })))
}

/// Keep only the final path component of a client-supplied file name
fn sanitize_filename(name: &str) -> Option<String> {
    FsPath::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<Value>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().and_then(sanitize_filename);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
        upload = Some((filename, data));
        break;
    }

    let Some((filename, data)) = upload else {
        return Err(ApiError::BadRequest("No file part".to_string()));
    };
    let Some(filename) = filename else {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    };
    if !input::is_allowed_file(&filename) {
        return Err(InputError::UnsupportedFormat.into());
    }

    let path = state.uploads_dir.join(format!("{}_{}", Uuid::new_v4(), filename));
    tokio::fs::write(&path, &data).await.map_err(|e| {
        error!("Failed to save upload to {}: {}", path.display(), e);
        ApiError::Internal("Could not save the uploaded file.".to_string())
    })?;
    info!("File '{}' uploaded to {}", filename, path.display());

    let ticket = match start_batch(&state, &path).await {
        Ok(ticket) => ticket,
        Err(e) => {
            // A rejected upload is never referenced by history
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("Could not remove rejected upload {}: {}", path.display(), remove_err);
            }
            return Err(e);
        }
    };

    Ok(Json(json!({
        "message": "Analysis started in the background. Check history for updates.",
        "report_id": ticket.report_id,
        "report_name": ticket.report_name,
    })))
}

async fn start_batch(state: &AppState, path: &FsPath) -> ApiResult<BatchTicket> {
    let read_path = path.to_path_buf();
    let sheet = tokio::task::spawn_blocking(move || input::read_sheet(&read_path))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    let names = sheet.require_company_names()?;

    let source_file = path.to_string_lossy().into_owned();
    let api_key = state.api_key().await?;
    let (ticket, _handle) = state
        .orchestrator
        .submit(names, Some(source_file), api_key.as_deref())
        .await?;
    Ok(ticket)
}

async fn get_history(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let history = store::blocking(state.store(), |store| Ok(store.load_history())).await?;
    Ok(Json(json!(history)))
}

async fn get_status(State(state): State<AppState>, Path(report_id): Path<String>) -> ApiResult<Response> {
    let status = match Uuid::parse_str(&report_id) {
        Ok(id) => state.orchestrator.status(id).await?,
        Err(_) => None,
    };
    Ok(match status {
        Some(view) => Json(view).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "status": "Unknown" }))).into_response(),
    })
}

async fn get_pe_firms(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let firms = store::blocking(state.store(), |store| Ok(store.load_known_firms())).await?;
    Ok(Json(firms))
}

async fn update_pe_firms(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let names = match body.get("pe_firms") {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(_) => {
            return Err(ApiError::BadRequest(
                "Invalid format for PE firms. Must be a list.".to_string(),
            ))
        }
    };
    let firms = known_firms::dedup_ignore_case(&names);
    store::blocking(state.store(), move |store| store.save_known_firms(&firms)).await?;
    Ok(Json(json!({ "message": "Private Equity firms list updated successfully!" })))
}

async fn load_report(state: &AppState, report_id: &str) -> ApiResult<Report> {
    let id = parse_report_id(report_id)?;
    store::blocking(state.store(), move |store| store.load_report(id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Report not found".to_string()))
}

async fn get_report(State(state): State<AppState>, Path(report_id): Path<String>) -> ApiResult<Json<Report>> {
    Ok(Json(load_report(&state, &report_id).await?))
}

async fn delete_report(State(state): State<AppState>, Path(report_id): Path<String>) -> ApiResult<Json<Value>> {
    let id = parse_report_id(&report_id)?;
    if state.orchestrator.delete_batch(id).await? {
        Ok(Json(json!({ "message": "Report deleted successfully" })))
    } else {
        Err(ApiError::NotFound("Report not found or could not be deleted".to_string()))
    }
}

/// Input rows for the download: the uploaded sheet when it is still on disk,
/// otherwise just the researched names.
fn input_rows_for(report: &Report) -> InputSheet {
    if let Some(source) = report.source_file.as_deref() {
        match input::read_sheet(FsPath::new(source)) {
            Ok(sheet) => return sheet,
            Err(e) => warn!("Could not re-read source file {}: {}; using company names only", source, e),
        }
    }
    InputSheet::from_names(report.companies.iter().map(|c| c.name.as_str()))
}

async fn download_report(State(state): State<AppState>, Path(report_id): Path<String>) -> ApiResult<Response> {
    let report = load_report(&state, &report_id).await?;
    let filename = report::download_filename(&report);
    let bytes = tokio::task::spawn_blocking(move || {
        let sheet = input_rows_for(&report);
        report::to_xlsx_bytes(&report, &sheet)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(|e| {
        error!("Failed to build report spreadsheet: {:#}", e);
        ApiError::Internal("Report could not be generated.".to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, report::XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd.csv").as_deref(), Some("passwd.csv"));
        assert_eq!(sanitize_filename("companies.xlsx").as_deref(), Some("companies.xlsx"));
        assert_eq!(sanitize_filename(""), None);
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(SubmitError::MissingCredential).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
