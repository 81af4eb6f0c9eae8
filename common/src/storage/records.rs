use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::warn;

use crate::error::AppError;

use super::{
    db::SurrealDbClient,
    types::{document::DocumentRef, extractor::Extractor, StoredObject},
};

const APPEND_DOCUMENTS: &str = "UPDATE type::thing($table, $id) \
    SET documents += $documents, updated_at = time::now() RETURN AFTER;";
const REMOVE_DOCUMENT: &str = "UPDATE type::thing($table, $id) \
    SET documents -= $document, updated_at = time::now() RETURN AFTER;";
const REFRESH_EXPIRY: &str = "UPDATE type::thing($table, $id) \
    SET expiry = $expiry, updated_at = time::now() RETURN AFTER;";

const UPDATE_ATTEMPTS: u32 = 8;
const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 250;

/// Persistence of extractor records, keyed by extractor id.
///
/// A missing record is `Ok(None)`; `Err` always means the backend failed.
/// Every mutation of an existing record touches only the fields it names, so
/// concurrent attach, detach and ping calls never overwrite each other.
#[async_trait]
pub trait ExtractorRecords: Send + Sync {
    async fn get_extractor(&self, id: &str) -> Result<Option<Extractor>, AppError>;

    /// Store a new record. Fails if the id is already taken.
    async fn insert_extractor(&self, extractor: &Extractor) -> Result<(), AppError>;

    async fn scan_extractors(&self) -> Result<Vec<Extractor>, AppError>;

    async fn refresh_expiry(
        &self,
        id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<Option<Extractor>, AppError>;

    /// Append to `documents` in one atomic update.
    async fn append_documents(
        &self,
        id: &str,
        documents: &[DocumentRef],
    ) -> Result<Option<Extractor>, AppError>;

    async fn remove_document(
        &self,
        id: &str,
        document: &DocumentRef,
    ) -> Result<Option<Extractor>, AppError>;

    /// Removing a missing record succeeds.
    async fn delete_extractor(&self, id: &str) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[async_trait]
impl ExtractorRecords for SurrealDbClient {
    async fn get_extractor(&self, id: &str) -> Result<Option<Extractor>, AppError> {
        Ok(self.get_item::<Extractor>(id).await?)
    }

    async fn insert_extractor(&self, extractor: &Extractor) -> Result<(), AppError> {
        self.store_item(extractor.clone()).await?;
        Ok(())
    }

    async fn scan_extractors(&self) -> Result<Vec<Extractor>, AppError> {
        Ok(self.get_all_stored_items::<Extractor>().await?)
    }

    async fn refresh_expiry(
        &self,
        id: &str,
        expiry: DateTime<Utc>,
    ) -> Result<Option<Extractor>, AppError> {
        self.update_extractor(
            REFRESH_EXPIRY,
            id,
            "expiry",
            surrealdb::sql::Datetime::from(expiry),
        )
        .await
    }

    async fn append_documents(
        &self,
        id: &str,
        documents: &[DocumentRef],
    ) -> Result<Option<Extractor>, AppError> {
        self.update_extractor(APPEND_DOCUMENTS, id, "documents", documents.to_vec())
            .await
    }

    async fn remove_document(
        &self,
        id: &str,
        document: &DocumentRef,
    ) -> Result<Option<Extractor>, AppError> {
        self.update_extractor(REMOVE_DOCUMENT, id, "document", document.clone())
            .await
    }

    async fn delete_extractor(&self, id: &str) -> Result<(), AppError> {
        let _removed: Option<Extractor> = self.delete_item(id).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client.query("RETURN true").await?.check()?;
        Ok(())
    }
}

impl SurrealDbClient {
    /// Run a single-record `UPDATE`, retrying transient commit conflicts
    /// with exponential backoff.
    async fn update_extractor<V>(
        &self,
        statement: &'static str,
        id: &str,
        name: &'static str,
        value: V,
    ) -> Result<Option<Extractor>, AppError>
    where
        V: Serialize + Clone + Send + Sync + 'static,
    {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let last_attempt = UPDATE_ATTEMPTS.saturating_sub(1);

        for attempt in 0..UPDATE_ATTEMPTS {
            match self.update_once(statement, id, name, value.clone()).await {
                Ok(updated) => return Ok(updated),
                Err(err) => {
                    if is_retryable_conflict(&err) && attempt < last_attempt {
                        let next_attempt = attempt.saturating_add(1);
                        warn!(
                            extractor_id = %id,
                            attempt = next_attempt,
                            "Transient SurrealDB conflict while updating extractor; retrying"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
                        continue;
                    }

                    return Err(AppError::from(err));
                }
            }
        }

        Err(AppError::InternalError(format!(
            "Failed to update extractor {id} after retries"
        )))
    }

    async fn update_once<V>(
        &self,
        statement: &'static str,
        id: &str,
        name: &'static str,
        value: V,
    ) -> Result<Option<Extractor>, surrealdb::Error>
    where
        V: Serialize + Send + 'static,
    {
        let mut response = self
            .client
            .query(statement)
            .bind(("table", Extractor::table_name()))
            .bind(("id", id.to_owned()))
            .bind((name, value))
            .await?;
        response.take(0)
    }
}

fn is_retryable_conflict(error: &surrealdb::Error) -> bool {
    error
        .to_string()
        .contains("Failed to commit transaction due to a read or write conflict")
}
