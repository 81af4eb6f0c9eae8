use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Extractor {0} has expired")]
    Expired(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("No free name for {path} after {attempts} attempts")]
    ProbeExhausted { path: String, attempts: u32 },
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Expired extractors are reported to callers the same way as missing ones.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired(_))
    }
}
