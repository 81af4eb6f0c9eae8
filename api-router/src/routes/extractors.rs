use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::lifecycle::NewExtractor;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

use super::envelope;

pub async fn list_extractors(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let extractors = state.lifecycle.read_all_extractors().await?;
    Ok(envelope(StatusCode::OK, extractors))
}

pub async fn create_extractor(
    State(state): State<ApiState>,
    payload: Result<Json<NewExtractor>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|rejection| {
        ApiError::ValidationError(format!("Invalid extractor data. {}", rejection.body_text()))
    })?;

    let extractor = state.lifecycle.create_extractor(input).await?;
    Ok(envelope(StatusCode::CREATED, extractor))
}

pub async fn get_extractor(
    State(state): State<ApiState>,
    Path(ext_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let extractor = state.lifecycle.read_extractor(&ext_id).await?;
    Ok(envelope(StatusCode::OK, extractor))
}

pub async fn ping_extractor(
    State(state): State<ApiState>,
    Path(ext_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let extractor = state.lifecycle.ping_extractor(&ext_id).await?;
    Ok(envelope(StatusCode::OK, extractor))
}

pub async fn delete_extractor(
    State(state): State<ApiState>,
    Path(ext_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.lifecycle.delete_extractor(&ext_id).await?;
    Ok(envelope(
        StatusCode::OK,
        json!({ "id": ext_id, "status": "deleted" }),
    ))
}

pub async fn purge_extractors(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let purged = state.lifecycle.purge_expired().await?;
    info!(purged = purged.len(), "Purge requested over HTTP");
    Ok(envelope(StatusCode::OK, purged))
}
