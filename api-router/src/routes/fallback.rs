use axum::http::{Method, Uri};

use crate::error::ApiError;

/// Answers any method and path combination no route handles.
pub async fn not_implemented(method: Method, uri: Uri) -> ApiError {
    tracing::debug!(%method, path = %uri.path(), "No route matched");
    ApiError::NotImplemented(format!("{method} {}", uri.path()))
}
