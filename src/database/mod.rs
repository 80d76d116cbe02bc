pub mod file;
pub mod manager;
pub mod memory;
pub mod ordering;
pub mod postgres;
pub mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use thiserror::Error;

use crate::config::DatabaseConfig;

pub use file::FileCollection;
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryCollection;
pub use postgres::PgCollection;
pub use schema::{DocumentSchema, Resource};

/// A stored record: an arbitrary JSON object carrying at least its primary key.
pub type Document = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a storage handle
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field_errors: HashMap<String, String>,
    },

    #[error("Duplicate value for {field}")]
    Duplicate { field: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            message: message.into(),
            field_errors: HashMap::new(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.into(), message.into());
        StoreError::Validation {
            message: "Validation failed".to_string(),
            field_errors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Window into a collection. Ties in `sort` keep the store's insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub skip: u64,
    pub limit: u64,
    pub sort: Option<SortSpec>,
}

/// Storage handle for one document collection.
///
/// Every operation is atomic at the single-document level. Ids are assigned
/// by the store on insert and written into the document under the schema's
/// primary key.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    fn primary_key(&self) -> &str;

    async fn find_all(&self) -> StoreResult<Vec<Document>>;

    async fn find_page(&self, query: &PageQuery) -> StoreResult<Vec<Document>>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>>;

    /// First document (in insertion order) whose `field` equals `value`.
    async fn find_one_by(&self, field: &str, value: &Value) -> StoreResult<Option<Document>>;

    async fn count(&self) -> StoreResult<u64>;

    /// Validates and stores `doc`, returning the assigned id.
    async fn insert(&self, doc: Document) -> StoreResult<String>;

    /// Merges `patch` into the stored document. `Ok(false)` when the id is unknown.
    async fn update_by_id(&self, id: &str, patch: Document) -> StoreResult<bool>;

    /// `Ok(false)` when there was nothing to delete.
    async fn delete_by_id(&self, id: &str) -> StoreResult<bool>;
}

/// Where collections live: PostgreSQL for a `postgres://` URL, JSON files
/// under a directory for a `file://` URL, process memory otherwise.
#[derive(Clone)]
pub enum StorageBackend {
    Memory,
    File(PathBuf),
    Postgres(PgPool),
}

impl StorageBackend {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        match config.url.as_deref() {
            Some(url) => match Self::file_directory(url)? {
                Some(directory) => {
                    tokio::fs::create_dir_all(&directory).await?;
                    tracing::info!("Storing records as JSON files under {}", directory.display());
                    Ok(StorageBackend::File(directory))
                }
                None => {
                    let pool = DatabaseManager::connect(url, config).await?;
                    PgCollection::ensure_table(&pool).await?;
                    Ok(StorageBackend::Postgres(pool))
                }
            },
            None => {
                tracing::warn!("No database URL configured; records are kept in memory and lost on restart");
                Ok(StorageBackend::Memory)
            }
        }
    }

    /// Directory named by a `file://` URL. Relative paths such as
    /// `file://./data` are kept relative to the working directory.
    fn file_directory(url: &str) -> Result<Option<PathBuf>, DatabaseError> {
        let Some(path) = url.strip_prefix("file://") else {
            return Ok(None);
        };
        if path.trim().is_empty() {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        Ok(Some(PathBuf::from(path)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::File(_) => "file",
            StorageBackend::Postgres(_) => "postgres",
        }
    }

    /// Storage handle for the collection backing `T`. In memory mode each call
    /// returns a new, empty collection, so call it once per resource. File
    /// handles for the same resource share a data file but not a cache.
    pub fn collection<T: Resource>(&self) -> Arc<dyn Collection> {
        let schema = DocumentSchema::of::<T>();
        match self {
            StorageBackend::Memory => Arc::new(MemoryCollection::new(schema)),
            StorageBackend::File(directory) => Arc::new(FileCollection::new(directory, schema)),
            StorageBackend::Postgres(pool) => Arc::new(PgCollection::new(pool.clone(), schema)),
        }
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        match self {
            StorageBackend::Memory => Ok(()),
            StorageBackend::File(directory) => {
                if tokio::fs::metadata(directory).await?.is_dir() {
                    Ok(())
                } else {
                    Err(DatabaseError::NotADirectory(directory.clone()))
                }
            }
            StorageBackend::Postgres(pool) => DatabaseManager::health_check(pool).await,
        }
    }
}
