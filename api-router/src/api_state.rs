use std::sync::Arc;

use common::{
    error::AppError,
    lifecycle::{ExtractorLifecycle, LifecycleSettings},
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::AppConfig,
};

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: ExtractorLifecycle,
    pub config: AppConfig,
}

impl ApiState {
    /// Connect the record store described by `config` and wire it, together
    /// with `storage`, into a lifecycle controller.
    pub async fn new(config: &AppConfig, storage: StorageManager) -> Result<Self, AppError> {
        let surreal_db_client = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        surreal_db_client.ensure_initialized().await?;

        let lifecycle = ExtractorLifecycle::new(
            surreal_db_client,
            Arc::new(storage),
            LifecycleSettings::from_config(config)?,
        );

        Ok(Self::with_lifecycle(config, lifecycle))
    }

    pub fn with_lifecycle(config: &AppConfig, lifecycle: ExtractorLifecycle) -> Self {
        Self {
            lifecycle,
            config: config.clone(),
        }
    }
}
