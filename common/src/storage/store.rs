use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::error::AppError;
use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Name of the zero-byte object that makes an empty extractor container visible.
pub const FOLDER_MARKER: &str = ".folder";

/// Blob storage as seen by the extractor lifecycle.
///
/// Paths are opaque, `/`-separated object locations built by the caller.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, AppError>;

    async fn upload(&self, path: &str, data: Bytes) -> Result<(), AppError>;

    /// Missing blobs are reported as `AppError::NotFound`.
    async fn download(&self, path: &str) -> Result<Bytes, AppError>;

    /// Deleting a missing blob succeeds.
    async fn delete(&self, path: &str) -> Result<(), AppError>;

    async fn list_under_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError>;

    async fn delete_many(&self, paths: Vec<String>) -> Result<(), AppError>;

    async fn create_folder_marker(&self, prefix: &str) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError> {
        self.exists(FOLDER_MARKER).await.map(|_| ())
    }
}

/// Storage manager with persistent state and proper lifecycle management.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    /// Create a new StorageManager with the specified configuration.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self {
            store,
            backend_kind,
            local_base,
        })
    }

    /// Create a StorageManager with a custom storage backend.
    ///
    /// Useful for tests that want to inject a specific backend.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
            local_base: None,
        }
    }

    /// Fresh, empty in-memory storage.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(InMemory::new()), StorageKind::Memory)
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// Access the resolved local base directory when using the local backend.
    pub fn local_base_path(&self) -> Option<&Path> {
        self.local_base.as_deref()
    }

    /// Store bytes at the specified location, replacing any existing object.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Retrieve bytes from the specified location, buffered in memory.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// Delete a single object. A missing object is not an error.
    pub async fn remove(&self, location: &str) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        if matches!(self.backend_kind, StorageKind::Local) {
            self.cleanup_filesystem_directories(location).await;
        }

        Ok(())
    }

    /// Delete a batch of objects in one streamed request.
    pub async fn remove_many(&self, locations: Vec<String>) -> object_store::Result<()> {
        if locations.is_empty() {
            return Ok(());
        }

        let paths = stream::iter(
            locations
                .iter()
                .map(|location| Ok(ObjPath::from(location.as_str())))
                .collect::<Vec<_>>(),
        )
        .boxed();

        let results: Vec<object_store::Result<ObjPath>> =
            self.store.delete_stream(paths).collect().await;
        for result in results {
            match result {
                Ok(_) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if matches!(self.backend_kind, StorageKind::Local) {
            for location in &locations {
                self.cleanup_filesystem_directories(location).await;
            }
        }

        Ok(())
    }

    /// List all objects below the specified prefix.
    pub async fn list(
        &self,
        prefix: Option<&str>,
    ) -> object_store::Result<Vec<object_store::ObjectMeta>> {
        let prefix_path = prefix.map(ObjPath::from);
        self.store.list(prefix_path.as_ref()).try_collect().await
    }

    /// Check if an object exists at the specified location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }

    /// Remove directories left empty after a delete on the local backend.
    ///
    /// Best effort: walks upwards from the object's parent and stops at the
    /// first non-empty directory or at the base directory.
    async fn cleanup_filesystem_directories(&self, location: &str) {
        let Some(base) = &self.local_base else {
            return;
        };

        let relative = Path::new(location);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            tracing::warn!(
                location = %location,
                "Skipping directory cleanup for unsupported path components"
            );
            return;
        }

        let Some(parent) = relative.parent() else {
            return;
        };
        let mut current = base.join(parent);

        while current.starts_with(base) && current.as_path() != base.as_path() {
            match tokio::fs::remove_dir(&current).await {
                Ok(()) => {}
                Err(err) => match err.kind() {
                    ErrorKind::NotFound => {}
                    ErrorKind::DirectoryNotEmpty => break,
                    _ => {
                        tracing::debug!(
                            error = %err,
                            path = %current.display(),
                            "Failed to remove directory during cleanup"
                        );
                        break;
                    }
                },
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl DocumentStore for StorageManager {
    async fn exists(&self, path: &str) -> Result<bool, AppError> {
        Ok(StorageManager::exists(self, path).await?)
    }

    async fn upload(&self, path: &str, data: Bytes) -> Result<(), AppError> {
        Ok(self.put(path, data).await?)
    }

    async fn download(&self, path: &str) -> Result<Bytes, AppError> {
        self.get(path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                AppError::NotFound(format!("No document stored at {path}"))
            }
            other => AppError::Storage(other),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), AppError> {
        Ok(self.remove(path).await?)
    }

    async fn list_under_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let listed = self.list(Some(prefix)).await?;
        Ok(listed
            .iter()
            .map(|meta| logical_location(&meta.location))
            .collect())
    }

    async fn delete_many(&self, paths: Vec<String>) -> Result<(), AppError> {
        Ok(self.remove_many(paths).await?)
    }

    async fn create_folder_marker(&self, prefix: &str) -> Result<(), AppError> {
        let location = format!("{}/{FOLDER_MARKER}", prefix.trim_end_matches('/'));
        Ok(self.put(&location, Bytes::new()).await?)
    }
}

/// Object-store locations come back percent-encoded; callers work with the
/// plain names they stored under.
fn logical_location(location: &ObjPath) -> String {
    let encoded = location.to_string();
    urlencoding::decode(&encoded)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| location.to_string())
}

/// Create a storage backend based on configuration.
async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
        StorageKind::S3 => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(&cfg.s3_bucket);
            if let Some(region) = &cfg.s3_region {
                builder = builder.with_region(region);
            }
            Ok((Arc::new(builder.build()?), None))
        }
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::StorageKind;
    use bytes::Bytes;

    fn test_config(root: &str) -> AppConfig {
        AppConfig {
            data_dir: root.into(),
            storage: StorageKind::Local,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_storage_manager_memory_basic_operations() {
        let storage = StorageManager::in_memory();
        assert!(storage.local_base_path().is_none());

        let location = "extractors/e1/RFP/file.txt";
        let data = b"test data for storage manager";

        storage
            .put(location, Bytes::from(data.to_vec()))
            .await
            .expect("put");
        let retrieved = storage.get(location).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);

        assert!(storage.exists(location).await.expect("exists check"));

        storage.remove(location).await.expect("delete");
        assert!(!storage
            .exists(location)
            .await
            .expect("exists check after delete"));
    }

    #[tokio::test]
    async fn test_storage_manager_local_basic_operations() {
        let temp = tempfile::tempdir().expect("temp dir");
        let base = temp.path().to_string_lossy().into_owned();
        let cfg = test_config(&base);
        let storage = StorageManager::new(&cfg)
            .await
            .expect("create storage manager");
        let resolved_base = storage
            .local_base_path()
            .expect("resolved base dir")
            .to_path_buf();
        assert_eq!(resolved_base, PathBuf::from(&base));

        let location = "extractors/e1/RFP/file.txt";
        let data = b"test data for local storage";

        storage
            .put(location, Bytes::from(data.to_vec()))
            .await
            .expect("put");
        let retrieved = storage.get(location).await.expect("get");
        assert_eq!(retrieved.as_ref(), data);

        let object_dir = resolved_base.join("extractors/e1/RFP");
        tokio::fs::metadata(&object_dir)
            .await
            .expect("object directory exists after write");

        storage
            .remove_many(vec![location.to_string()])
            .await
            .expect("delete");
        assert!(!storage
            .exists(location)
            .await
            .expect("exists check after delete"));
        assert!(
            tokio::fs::metadata(&object_dir).await.is_err(),
            "object directory should be removed"
        );
        tokio::fs::metadata(&resolved_base)
            .await
            .expect("base directory remains intact");
    }

    #[tokio::test]
    async fn test_list_is_segment_scoped() {
        let storage = StorageManager::in_memory();

        for location in [
            "extractors/abc/RFP/one.pdf",
            "extractors/abc/census/two.csv",
            "extractors/abcd/RFP/three.pdf",
        ] {
            storage
                .put(location, Bytes::from_static(b"x"))
                .await
                .expect("put");
        }

        let listed = storage
            .list_under_prefix("extractors/abc")
            .await
            .expect("list");
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|p| p.starts_with("extractors/abc/")));

        let empty = storage
            .list_under_prefix("extractors/missing")
            .await
            .expect("list missing");
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_folder_marker_is_listed_under_prefix() {
        let storage = StorageManager::in_memory();
        storage
            .create_folder_marker("extractors/e1/")
            .await
            .expect("marker");

        let listed = storage
            .list_under_prefix("extractors/e1")
            .await
            .expect("list");
        assert_eq!(listed, vec![format!("extractors/e1/{FOLDER_MARKER}")]);
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let storage = StorageManager::in_memory();
        let result = storage.download("extractors/none/RFP/x.pdf").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_and_empty_batch_succeed() {
        let storage = StorageManager::in_memory();
        DocumentStore::delete(&storage, "extractors/none/RFP/x.pdf")
            .await
            .expect("delete missing");
        storage.delete_many(Vec::new()).await.expect("empty batch");
    }

    #[tokio::test]
    async fn test_delete_many_removes_every_path() {
        let storage = StorageManager::in_memory();
        let paths = vec![
            "extractors/e1/RFP/a.pdf".to_string(),
            "extractors/e1/RFP/b.pdf".to_string(),
            "extractors/e1/census/c.csv".to_string(),
        ];
        for path in &paths {
            storage
                .upload(path, Bytes::from_static(b"data"))
                .await
                .expect("upload");
        }

        storage.delete_many(paths.clone()).await.expect("delete");

        for path in &paths {
            assert!(!DocumentStore::exists(&storage, path)
                .await
                .expect("exists"));
        }
    }

    #[tokio::test]
    async fn test_listed_paths_match_stored_names() {
        let storage = StorageManager::in_memory();
        let path = "extractors/e1/RFP/Q3 résumé.v2.pdf".to_string();
        storage
            .upload(&path, Bytes::from_static(b"pdf"))
            .await
            .expect("upload");

        let listed = storage.list_under_prefix("extractors/e1").await.expect("list");
        assert_eq!(listed, vec![path.clone()]);
        assert_eq!(
            storage.download(&path).await.expect("download").as_ref(),
            b"pdf"
        );

        storage.delete_many(listed).await.expect("delete listed");
        assert!(!DocumentStore::exists(&storage, &path)
            .await
            .expect("exists"));
    }

    #[tokio::test]
    async fn test_storage_manager_with_custom_backend() {
        let custom_store = InMemory::new();
        let storage = StorageManager::with_backend(Arc::new(custom_store), StorageKind::Memory);

        storage
            .put("custom/test.txt", Bytes::from_static(b"custom backend test"))
            .await
            .expect("put");
        assert!(storage.exists("custom/test.txt").await.expect("exists"));
        assert_eq!(*storage.backend_kind(), StorageKind::Memory);
    }
}
