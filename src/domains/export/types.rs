use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domains::storage::StorageError;
use crate::domains::upload::types::{UploadQuery, UploadSort, UploadSortField};
use crate::errors::{DbError, ValidationError};
use crate::types::SortDirection;
use crate::validation::{Validate, ValidationBuilder};

/// Rows fetched per cursor round trip unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Encoded bytes accumulated before a chunk is handed to the sink
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
/// Chunks the sink buffers between the encoder and the storage upload
pub const DEFAULT_SINK_CAPACITY: usize = 4;
pub const MAX_BATCH_SIZE: usize = 1000;
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Logical folder every export lands in
pub const EXPORT_FOLDER: &str = "downloads";
/// Fixed suffix of every export file name
pub const EXPORT_FILE_SUFFIX: &str = "uploads.csv";

/// Error kinds an export can fail with. Exactly one is reported per failed export.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
pub enum ExportError {
    /// Malformed request; nothing was started
    #[error("Invalid export request: {0}")]
    Validation(ValidationError),
    /// Store unreachable or query rejected
    #[error("Query failed: {0}")]
    Query(String),
    /// Encoding or intra-pipeline stream fault
    #[error("Stream failed: {0}")]
    Stream(String),
    /// Upload rejected, interrupted or not fully consumed
    #[error("Storage failed: {0}")]
    Storage(String),
}

impl ExportError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExportError::Validation(_) => "validation",
            ExportError::Query(_) => "query",
            ExportError::Stream(_) => "stream",
            ExportError::Storage(_) => "storage",
        }
    }
}

impl From<ValidationError> for ExportError {
    fn from(error: ValidationError) -> Self {
        ExportError::Validation(error)
    }
}

impl From<DbError> for ExportError {
    fn from(error: DbError) -> Self {
        ExportError::Query(error.to_string())
    }
}

impl From<sqlx::Error> for ExportError {
    fn from(error: sqlx::Error) -> Self {
        ExportError::Query(error.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(error: csv::Error) -> Self {
        ExportError::Stream(error.to_string())
    }
}

impl From<StorageError> for ExportError {
    fn from(error: StorageError) -> Self {
        ExportError::Storage(error.to_string())
    }
}

pub type ExportResult<T> = Result<T, ExportError>;

/// One exported row: the columns projected out of `uploads`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub name: String,
    pub remote_url: String,
    pub created_at: DateTime<Utc>,
}

/// Raw export input as it arrives from a client. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportUploadsInput {
    search_query: Option<String>,
    sort_by: Option<UploadSortField>,
    sort_direction: Option<SortDirection>,
}

/// A well-formed export request. Immutable once built.
///
/// Any string is a valid search term, so a request built from typed values
/// cannot be malformed; only [`ExportRequest::parse`] can fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRequest {
    query: UploadQuery,
}

impl ExportRequest {
    /// Export every upload whose name contains `search_query`, or all of them.
    pub fn new(search_query: Option<String>) -> Self {
        Self {
            query: UploadQuery {
                search_query,
                sort: None,
            },
        }
    }

    /// Export in creation-time order instead of the default id order.
    pub fn sorted_by_created_at(search_query: Option<String>, direction: SortDirection) -> Self {
        Self {
            query: UploadQuery {
                search_query,
                sort: Some(UploadSort {
                    field: UploadSortField::CreatedAt,
                    direction,
                }),
            },
        }
    }

    /// Parse and validate a JSON body such as `{"searchQuery": "cat"}`.
    pub fn parse(input: serde_json::Value) -> ExportResult<Self> {
        let input: ExportUploadsInput = serde_json::from_value(input)
            .map_err(|e| ValidationError::format("body", &e.to_string()))?;

        // sortDirection alone keeps the default id order
        let sort = input.sort_by.map(|field| UploadSort {
            field,
            direction: input.sort_direction.unwrap_or_default(),
        });

        Ok(Self {
            query: UploadQuery {
                search_query: input.search_query,
                sort,
            },
        })
    }

    pub fn query(&self) -> &UploadQuery {
        &self.query
    }

    pub fn search_query(&self) -> Option<&str> {
        self.query.effective_search()
    }
}

/// Tunables for the export pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportConfig {
    pub batch_size: usize,
    pub chunk_size: usize,
    pub sink_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sink_capacity: DEFAULT_SINK_CAPACITY,
        }
    }
}

impl Validate for ExportConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationBuilder::new("batch_size", Some(self.batch_size))
            .range(1, MAX_BATCH_SIZE)
            .validate()?;
        ValidationBuilder::new("chunk_size", Some(self.chunk_size))
            .min(MIN_CHUNK_SIZE)
            .validate()?;
        ValidationBuilder::new("sink_capacity", Some(self.sink_capacity))
            .min(1)
            .validate()
    }
}

/// Lifecycle of a single export invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Idle,
    Querying,
    Streaming,
    AwaitingUploadConfirm,
    Completed,
    Failed,
}

impl ExportStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStage::Completed | ExportStage::Failed)
    }

    pub fn can_transition_to(&self, next: ExportStage) -> bool {
        use ExportStage::*;
        match (*self, next) {
            (Idle, Querying)
            | (Querying, Streaming)
            | (Streaming, AwaitingUploadConfirm)
            | (AwaitingUploadConfirm, Completed) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Progress snapshot published on stage transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportProgress {
    pub export_id: Uuid,
    pub stage: ExportStage,
    pub rows_written: u64,
    pub bytes_written: u64,
}

/// Counters gathered while the pipeline runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub rows_written: u64,
    pub bytes_written: u64,
    pub chunks_written: u64,
    /// Largest batch handed out by the row source
    pub peak_batch_rows: usize,
    /// Largest encoded chunk handed to the sink
    pub peak_chunk_bytes: usize,
    pub duration_ms: u64,
}

/// The one value a successful export produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub export_id: Uuid,
    pub report_url: String,
    pub destination_key: String,
    /// SHA-256 of the uploaded document, hex encoded
    pub checksum: String,
    pub stats: ExportStats,
}
