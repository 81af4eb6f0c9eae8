use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
    S3,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_s3_bucket")]
    pub s3_bucket: String,
    #[serde(default)]
    pub s3_region: Option<String>,
    #[serde(default = "default_documents_root")]
    pub documents_root: String,
    #[serde(default = "default_extractor_ttl_days")]
    pub extractor_ttl_days: i64,
    #[serde(default = "default_max_copy_probes")]
    pub max_copy_probes: u32,
    #[serde(default = "default_upload_max_body_bytes")]
    pub upload_max_body_bytes: usize,
}

fn default_http_port() -> u16 {
    3000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_s3_bucket() -> String {
    "extractordocuments".to_string()
}

fn default_documents_root() -> String {
    "extractors".to_string()
}

/// TTL applied when `extractor_ttl_days` is not configured.
pub const DEFAULT_EXTRACTOR_TTL_DAYS: i64 = 365;
/// Upper bound accepted for `extractor_ttl_days`.
pub const MAX_EXTRACTOR_TTL_DAYS: i64 = 36_500;

fn default_extractor_ttl_days() -> i64 {
    DEFAULT_EXTRACTOR_TTL_DAYS
}

fn default_max_copy_probes() -> u32 {
    1000
}

fn default_upload_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "extractors".to_string(),
            surrealdb_database: "extractors".to_string(),
            http_port: default_http_port(),
            storage: default_storage_kind(),
            data_dir: default_data_dir(),
            s3_bucket: default_s3_bucket(),
            s3_region: None,
            documents_root: default_documents_root(),
            extractor_ttl_days: default_extractor_ttl_days(),
            max_copy_probes: default_max_copy_probes(),
            upload_max_body_bytes: default_upload_max_body_bytes(),
        }
    }
}

impl AppConfig {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_EXTRACTOR_TTL_DAYS).contains(&self.extractor_ttl_days) {
            return Err(ConfigError::Message(format!(
                "extractor_ttl_days must be between 1 and {MAX_EXTRACTOR_TTL_DAYS}, got {}",
                self.extractor_ttl_days
            )));
        }
        Ok(())
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config: AppConfig = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}
