//! Contract document endpoints over the file share.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use bytes::Bytes;
use domain::Attachment;
use integrations::SharedFile;
use serde::{Deserialize, Serialize};
use table_store::TableBackend;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct UploadContractQuery {
    pub file_name: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadedContract {
    pub name: String,
}

/// GET /contracts: list the documents on the share.
#[tracing::instrument(skip(state))]
pub async fn list<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Result<Json<Vec<SharedFile>>, ApiError> {
    Ok(Json(state.contracts.list().await?))
}

/// POST /contracts?file_name=...&display_name=...: store the raw request
/// body as a new document.
#[tracing::instrument(skip(state, body), fields(size = body.len()))]
pub async fn upload<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<UploadContractQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadedContract>), ApiError> {
    let file = Attachment::new(body, query.file_name.unwrap_or_default());
    let name = state
        .contracts
        .upload(file, query.display_name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(UploadedContract { name })))
}

/// GET /contracts/{name}: download a document as an attachment.
#[tracing::instrument(skip(state))]
pub async fn download<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state.contracts.download(&name).await?;
    let disposition = format!("attachment; filename=\"{}\"", name.replace('"', "'"));
    let headers = [
        (CONTENT_TYPE, "application/octet-stream".to_string()),
        (CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, data))
}

/// DELETE /contracts/{name}
#[tracing::instrument(skip(state))]
pub async fn delete<B: TableBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.contracts.delete(&name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Contract {name} not found")))
    }
}
