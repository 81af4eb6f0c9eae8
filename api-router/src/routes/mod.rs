use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

pub mod documents;
pub mod extractors;
pub mod fallback;
pub mod liveness;
pub mod readiness;

#[derive(Serialize, Debug)]
struct Envelope<T> {
    body: T,
}

/// Wrap a successful payload as `{ "body": payload }`.
fn envelope<T: Serialize>(status: StatusCode, body: T) -> impl IntoResponse {
    (status, Json(Envelope { body }))
}
