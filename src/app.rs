use crate::config::{Config, StorageBackend};
use crate::db_migration::run_migrations;
use crate::domains::export::repository::SqliteRowSource;
use crate::domains::export::service::ExportService;
use crate::domains::storage::{HttpObjectStorage, LocalObjectStorage, ObjectStorage};
use crate::domains::upload::repository::SqliteUploadRepository;
use crate::domains::upload::service::UploadServiceImpl;
use crate::errors::{DbError, ServiceError, ServiceResult};
use log::{debug, info};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Everything a caller needs, wired once at startup
#[derive(Clone)]
pub struct AppContext {
    pub pool: SqlitePool,
    pub storage: Arc<dyn ObjectStorage>,
    pub upload_service: Arc<UploadServiceImpl>,
    pub export_service: Arc<ExportService>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("pool", &self.pool)
            .field("storage", &"<ObjectStorage>")
            .field("export_service", &self.export_service)
            .finish()
    }
}

/// Start logging, connect and migrate the database, then assemble the services.
pub async fn initialize(config: &Config) -> ServiceResult<AppContext> {
    // Harmless if a logger is already installed
    let _ = env_logger::try_init();

    info!("Initializing upload export core");
    debug!("Database URL: {}", config.database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::ConnectionPool(format!("Database connection failed: {}", e)))?;

    run_migrations(&pool).await?;

    let storage = build_storage(&config.storage)?;
    build_context(pool, storage, config)
}

/// Assemble services over an already migrated pool
pub fn build_context(pool: SqlitePool, storage: Arc<dyn ObjectStorage>, config: &Config) -> ServiceResult<AppContext> {
    let upload_service = Arc::new(UploadServiceImpl::new(Arc::new(SqliteUploadRepository::new(pool.clone()))));
    let export_service = Arc::new(ExportService::new(
        Arc::new(SqliteRowSource::new(pool.clone())),
        storage.clone(),
        config.export,
    )?);

    Ok(AppContext {
        pool,
        storage,
        upload_service,
        export_service,
    })
}

fn build_storage(backend: &StorageBackend) -> ServiceResult<Arc<dyn ObjectStorage>> {
    let storage: Arc<dyn ObjectStorage> = match backend {
        StorageBackend::Local { path, public_url } => {
            info!("Using local storage at {}", path);
            Arc::new(
                LocalObjectStorage::new(path, public_url.clone())
                    .map_err(|e| ServiceError::Configuration(e.to_string()))?,
            )
        }
        StorageBackend::Http { endpoint, bucket, access_token, public_url } => {
            info!("Using HTTP storage at {} (bucket {})", endpoint, bucket);
            Arc::new(
                HttpObjectStorage::new(endpoint, bucket, access_token.clone(), public_url.clone())
                    .map_err(|e| ServiceError::Configuration(e.to_string()))?,
            )
        }
    };
    Ok(storage)
}
