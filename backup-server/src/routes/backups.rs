use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use backup_engine::{BackupKind, BackupRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

const ACTOR_HEADER: &str = "x-actor-id";
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backups))
        // POST takes a kind in the same position that GET and DELETE take an id.
        .route(
            "/{id}",
            get(get_backup).post(start_backup).delete(delete_backup),
        )
        .route("/{id}/download", get(download_backup))
}

/// A record as the presentation layer consumes it
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    #[serde(flatten)]
    pub record: BackupRecord,
    pub size_mb: f64,
}

impl From<BackupRecord> for RecordResponse {
    fn from(record: BackupRecord) -> Self {
        let size_mb = record.size_mb();
        Self { record, size_mb }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RecordResponse>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let records = state.orchestrator.list(limit).await?;
    Ok(Json(records.into_iter().map(RecordResponse::from).collect()))
}

async fn get_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = state.orchestrator.get(&id).await?;
    Ok(Json(record.into()))
}

async fn start_backup(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let kind: BackupKind = kind
        .parse()
        .map_err(|e: String| AppError::BadRequest(e))?;

    let initiator = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    let record = state.orchestrator.start(kind, initiator).await?;
    tracing::info!(id = %record.id, kind = %kind, "Backup accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": record.id, "status": record.status })),
    ))
}

async fn download_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let download = state.orchestrator.fetch_artifact(&id).await?;

    let disposition = format!("attachment; filename=\"{}\"", download.file_name);
    let body = Body::from_stream(ReaderStream::new(download.file));

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, download.size_bytes.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
