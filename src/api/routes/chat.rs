use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::api::{error::ApiError, state::AppState};
use crate::application::Reply;
use crate::domain::Message;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub answer_index: usize,
    pub sources: BTreeSet<String>,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Reply>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;
    let mut session = session.lock().await;
    let reply = session.ask(&request.message, request.temperature).await?;
    Ok(Json(reply))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;
    let messages = session.lock().await.messages().to_vec();
    Ok(Json(messages))
}

pub async fn clear_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;
    session.lock().await.clear_chat();
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_sources(
    State(state): State<AppState>,
    Path((id, answer_index)): Path<(Uuid, usize)>,
) -> Result<Json<SourcesResponse>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;
    let session = session.lock().await;
    let sources = session.sources_for(answer_index).cloned().ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no answer {answer_index} in session {id}"),
        )
    })?;
    Ok(Json(SourcesResponse {
        answer_index,
        sources,
    }))
}
