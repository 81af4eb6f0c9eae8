use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart, TypedMultipartError};
use bytes::Bytes;
use common::lifecycle::IncomingDocument;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

use super::envelope;

#[derive(Debug, TryFromMultipart)]
pub struct AttachParams {
    #[form_data(limit = "unlimited")]
    #[form_data(default)]
    pub files: Vec<FieldData<NamedTempFile>>,
}

pub async fn attach_documents(
    State(state): State<ApiState>,
    Path((ext_id, doc_type)): Path<(String, String)>,
    multipart: Result<TypedMultipart<AttachParams>, TypedMultipartError>,
) -> Result<impl IntoResponse, ApiError> {
    let TypedMultipart(input) = multipart.map_err(multipart_rejection)?;

    info!(
        extractor_id = %ext_id,
        doc_type = %doc_type,
        file_count = input.files.len(),
        "Received attach request"
    );

    let mut files = Vec::with_capacity(input.files.len());
    for field in input.files {
        let file_name = field
            .metadata
            .file_name
            .ok_or_else(|| ApiError::ValidationError("File name is missing".to_string()))?;
        let content = tokio::fs::read(field.contents.path())
            .await
            .map_err(common::error::AppError::from)?;
        files.push(IncomingDocument {
            file_name,
            content: Bytes::from(content),
        });
    }

    let documents = state
        .lifecycle
        .create_documents(&ext_id, &doc_type, files)
        .await?;
    Ok(envelope(StatusCode::CREATED, documents))
}

/// Serve the stored bytes as an attachment.
pub async fn get_document(
    State(state): State<ApiState>,
    Path((ext_id, doc_type, doc_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let download = state
        .lifecycle
        .read_document(&ext_id, &doc_type, &doc_id)
        .await?;

    let body = download.decode_body().map_err(|e| {
        tracing::error!(error = %e, doc_id = %doc_id, "Download body is not valid base64");
        ApiError::InternalError("Internal server error".to_string())
    })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, download.content_type),
            (header::CONTENT_DISPOSITION, download.content_disposition),
        ],
        body,
    ))
}

pub async fn delete_document(
    State(state): State<ApiState>,
    Path((ext_id, doc_type, doc_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .lifecycle
        .delete_document(&ext_id, &doc_type, &doc_id)
        .await?;
    Ok(envelope(StatusCode::OK, removed))
}

fn multipart_rejection(rejection: TypedMultipartError) -> ApiError {
    let message = rejection.to_string();
    if rejection.into_response().status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::ValidationError(message)
    }
}
