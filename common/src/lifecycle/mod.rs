//! Extractor lifecycle: create, keep alive, expire, purge, and attach or
//! detach documents.
//!
//! The record store and the blob store are written one after the other with
//! no transaction spanning them. A failure between the two writes of an
//! attach or detach leaves them out of step until the caller retries.

pub mod naming;


use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    storage::{
        records::ExtractorRecords,
        store::DocumentStore,
        types::{
            document::DocumentRef,
            extractor::{Extractor, ExtractorState, EXTRACTOR_SEED},
        },
    },
    utils::{
        config::{AppConfig, DEFAULT_EXTRACTOR_TTL_DAYS},
        short_id,
    },
};

/// Fresh ids are re-drawn this many times if they clash with a stored record.
const ID_DRAW_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub ttl: Duration,
    pub documents_root: String,
    pub max_copy_probes: u32,
}

impl LifecycleSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        config
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let ttl = Duration::try_days(config.extractor_ttl_days).ok_or_else(|| {
            AppError::Validation(format!(
                "extractor_ttl_days out of range: {}",
                config.extractor_ttl_days
            ))
        })?;

        Ok(Self {
            ttl,
            documents_root: config.documents_root.clone(),
            max_copy_probes: config.max_copy_probes,
        })
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        let config = AppConfig::default();
        Self {
            ttl: Duration::days(DEFAULT_EXTRACTOR_TTL_DAYS),
            documents_root: config.documents_root,
            max_copy_probes: config.max_copy_probes,
        }
    }
}

/// Caller-supplied fields for a new extractor. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewExtractor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One file of an attach request.
#[derive(Debug, Clone)]
pub struct IncomingDocument {
    pub file_name: String,
    pub content: Bytes,
}

/// A stored document prepared for transport.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentDownload {
    pub file_name: String,
    pub content_type: String,
    pub content_disposition: String,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl DocumentDownload {
    fn new(file_name: &str, content: &[u8]) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
            content_disposition: attachment_disposition(file_name),
            body: STANDARD.encode(content),
            is_base64_encoded: true,
        }
    }

    pub fn decode_body(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.body)
    }
}

/// Orchestrates extractor records and their document blobs.
///
/// Holds no mutable state of its own, so one instance serves every request.
#[derive(Clone)]
pub struct ExtractorLifecycle {
    records: Arc<dyn ExtractorRecords>,
    documents: Arc<dyn DocumentStore>,
    settings: LifecycleSettings,
}

impl ExtractorLifecycle {
    pub fn new(
        records: Arc<dyn ExtractorRecords>,
        documents: Arc<dyn DocumentStore>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            records,
            documents,
            settings,
        }
    }

    pub async fn create_extractor(&self, input: NewExtractor) -> Result<Extractor, AppError> {
        let (Some(name), Some(description)) = (
            non_blank(input.name),
            non_blank(input.description),
        ) else {
            return Err(AppError::Validation(
                "Invalid extractor data. Name and description are required.".to_string(),
            ));
        };

        let mut extractor = Extractor::new(name, description, self.settings.ttl);
        let mut draws: usize = 1;
        while self.records.get_extractor(&extractor.id).await?.is_some() {
            if draws >= ID_DRAW_ATTEMPTS {
                return Err(AppError::InternalError(format!(
                    "No unused extractor id after {draws} draws"
                )));
            }
            draws = draws.saturating_add(1);
            extractor.id = short_id::generate(EXTRACTOR_SEED);
        }

        self.records.insert_extractor(&extractor).await?;
        self.documents
            .create_folder_marker(&self.container_prefix(&extractor.id))
            .await?;

        info!(
            extractor_id = %extractor.id,
            expiry = %extractor.expiry,
            "Created extractor"
        );
        Ok(extractor)
    }

    /// Push the expiry of a live extractor `ttl` into the future.
    pub async fn ping_extractor(&self, extractor_id: &str) -> Result<Extractor, AppError> {
        let extractor = self.require_extractor(extractor_id).await?;

        let now = Utc::now();
        if extractor.state_at(now) == ExtractorState::Expired {
            return Err(AppError::Expired(extractor_id.to_string()));
        }

        let expiry = now.checked_add_signed(self.settings.ttl).ok_or_else(|| {
            AppError::InternalError(format!("Expiry overflow for extractor {extractor_id}"))
        })?;
        let extractor = self
            .records
            .refresh_expiry(extractor_id, expiry)
            .await?
            .ok_or_else(|| extractor_not_found(extractor_id))?;

        debug!(extractor_id = %extractor_id, expiry = %extractor.expiry, "Pinged extractor");
        Ok(extractor)
    }

    pub async fn read_extractor(&self, extractor_id: &str) -> Result<Extractor, AppError> {
        self.require_extractor(extractor_id).await
    }

    /// All stored extractors; an empty store yields an empty list.
    pub async fn read_all_extractors(&self) -> Result<Vec<Extractor>, AppError> {
        self.records.scan_extractors().await
    }

    /// Upload `files` under `doc_type` and reference them from the extractor.
    ///
    /// Files are handled strictly in order. Each name is probed for a clash and
    /// gets the first free `-copy(n)` variant. The new references are appended
    /// to the record in one update after every upload has finished, leaving
    /// entries added by concurrent calls in place.
    pub async fn create_documents(
        &self,
        extractor_id: &str,
        doc_type: &str,
        files: Vec<IncomingDocument>,
    ) -> Result<Vec<DocumentRef>, AppError> {
        let doc_type = naming::path_segment(doc_type, "document type")?;
        if files.is_empty() {
            return Err(AppError::Validation("No files uploaded".to_string()));
        }

        let extractor = self.require_extractor(extractor_id).await?;
        let prefix =
            naming::category_prefix(&self.settings.documents_root, &extractor.id, doc_type);

        let mut uploaded: Vec<DocumentRef> = Vec::with_capacity(files.len());
        for file in files {
            let stored = self.upload_one(&prefix, doc_type, file).await;
            match stored {
                Ok(doc) => uploaded.push(doc),
                Err(err) => {
                    if !uploaded.is_empty() {
                        warn!(
                            extractor_id = %extractor_id,
                            orphaned = ?uploaded.iter().map(|d| d.path.as_str()).collect::<Vec<_>>(),
                            "Attach aborted; already uploaded blobs are not referenced by the record"
                        );
                    }
                    return Err(err);
                }
            }
        }

        match self.records.append_documents(extractor_id, &uploaded).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    extractor_id = %extractor_id,
                    orphaned = uploaded.len(),
                    "Extractor deleted while its documents were uploading"
                );
                return Err(extractor_not_found(extractor_id));
            }
            Err(err) => {
                warn!(
                    extractor_id = %extractor_id,
                    orphaned = uploaded.len(),
                    "Blobs uploaded but the extractor record could not be updated"
                );
                return Err(err);
            }
        }

        info!(
            extractor_id = %extractor_id,
            doc_type = %doc_type,
            count = uploaded.len(),
            "Attached documents"
        );
        Ok(uploaded)
    }

    pub async fn read_document(
        &self,
        extractor_id: &str,
        doc_type: &str,
        doc_id: &str,
    ) -> Result<DocumentDownload, AppError> {
        let extractor = self.require_extractor(extractor_id).await?;
        let document = extractor
            .find_document(doc_type, doc_id)
            .ok_or_else(|| document_not_found(doc_id))?;

        let content = self.documents.download(&document.path).await?;
        Ok(DocumentDownload::new(document.file_name(), &content))
    }

    /// Delete one blob and drop its reference. Returns the removed reference.
    pub async fn delete_document(
        &self,
        extractor_id: &str,
        doc_type: &str,
        doc_id: &str,
    ) -> Result<DocumentRef, AppError> {
        let extractor = self.require_extractor(extractor_id).await?;
        let removed = extractor
            .find_document(doc_type, doc_id)
            .cloned()
            .ok_or_else(|| document_not_found(doc_id))?;

        self.documents.delete(&removed.path).await?;

        match self.records.remove_document(extractor_id, &removed).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(extractor_not_found(extractor_id)),
            Err(err) => {
                warn!(
                    extractor_id = %extractor_id,
                    path = %removed.path,
                    "Blob deleted but the extractor record still references it"
                );
                return Err(err);
            }
        }

        info!(extractor_id = %extractor_id, doc_id = %doc_id, "Detached document");
        Ok(removed)
    }

    /// Remove every blob under the extractor's prefix, then its record.
    ///
    /// Succeeds for an id with nothing stored.
    pub async fn delete_extractor(&self, extractor_id: &str) -> Result<(), AppError> {
        let extractor_id = naming::path_segment(extractor_id, "extractor id")?;
        let paths = self
            .documents
            .list_under_prefix(&self.container_prefix(extractor_id))
            .await?;
        let blob_count = paths.len();

        self.documents.delete_many(paths).await?;
        self.records.delete_extractor(extractor_id).await?;

        info!(extractor_id = %extractor_id, blob_count, "Deleted extractor");
        Ok(())
    }

    /// Delete every extractor whose expiry has passed and return those removed.
    pub async fn purge_expired(&self) -> Result<Vec<Extractor>, AppError> {
        let now = Utc::now();
        let snapshot = self.records.scan_extractors().await?;
        let expired: Vec<Extractor> = snapshot
            .into_iter()
            .filter(|candidate| candidate.expiry < now)
            .collect();

        for expired_extractor in &expired {
            self.delete_extractor(&expired_extractor.id).await?;
        }

        info!(purged = expired.len(), "Purged expired extractors");
        Ok(expired)
    }

    /// Both backing stores answer.
    pub async fn check_ready(&self) -> Result<(), AppError> {
        self.records.health_check().await?;
        self.documents.health_check().await
    }

    async fn require_extractor(&self, extractor_id: &str) -> Result<Extractor, AppError> {
        self.records
            .get_extractor(extractor_id)
            .await?
            .ok_or_else(|| extractor_not_found(extractor_id))
    }

    async fn upload_one(
        &self,
        prefix: &str,
        doc_type: &str,
        file: IncomingDocument,
    ) -> Result<DocumentRef, AppError> {
        let file_name = naming::sanitize_file_name(&file.file_name)?;
        let path = self.free_path(prefix, &file_name).await?;

        self.documents.upload(&path, file.content).await?;
        debug!(path = %path, "Uploaded document");

        Ok(DocumentRef::new(doc_type, path))
    }

    /// First path among `name`, `name-copy(1)`, `name-copy(2)`, ... with no blob.
    async fn free_path(&self, prefix: &str, file_name: &str) -> Result<String, AppError> {
        let original = format!("{prefix}/{file_name}");
        let mut candidate = original.clone();
        let mut copy: u32 = 0;

        while self.documents.exists(&candidate).await? {
            if copy >= self.settings.max_copy_probes {
                return Err(AppError::ProbeExhausted {
                    path: original,
                    attempts: copy,
                });
            }
            copy = copy.saturating_add(1);
            candidate = format!("{prefix}/{}", naming::copy_name(file_name, copy));
            debug!(candidate = %candidate, "Name taken, probing next copy");
        }

        Ok(candidate)
    }

    fn container_prefix(&self, extractor_id: &str) -> String {
        naming::container_prefix(&self.settings.documents_root, extractor_id)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn extractor_not_found(extractor_id: &str) -> AppError {
    AppError::NotFound(format!("Extractor {extractor_id} does not exist"))
}

fn document_not_found(doc_id: &str) -> AppError {
    AppError::NotFound(format!("Document {doc_id} not found"))
}

/// `Content-Disposition` for a download. Names that are not plain printable
/// ASCII get an ASCII `filename` fallback plus the exact name as an RFC 6266
/// `filename*` parameter.
fn attachment_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == file_name {
        format!("attachment; filename=\"{file_name}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(file_name)
        )
    }
}
