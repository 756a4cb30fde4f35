use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{error::ApiError, state::AppState};
use crate::application::{IngestReport, SessionStatus};
use crate::domain::Document;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub report: IngestReport,
    pub session: SessionStatus,
}

/// Processes every file part of the upload as one batch.
pub async fn upload_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;

    let mut documents = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}", documents.len() + 1));
        let bytes = field.bytes().await?;
        tracing::debug!(document = %name, bytes = bytes.len(), "received upload");
        documents.push(Document::new(name, bytes.to_vec()));
    }

    let mut session = session.lock().await;
    let report = session.process_documents(documents).await?;
    Ok(Json(UploadResponse {
        report,
        session: session.status(),
    }))
}

pub async fn clear_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatus>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;
    let mut session = session.lock().await;
    session.clear_documents();
    Ok(Json(session.status()))
}
