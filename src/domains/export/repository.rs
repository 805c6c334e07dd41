use crate::domains::export::types::*;
use crate::domains::upload::repository::{push_upload_filter, push_upload_order};
use crate::domains::upload::types::{parse_timestamp, parse_uuid, UploadQuery};
use async_trait::async_trait;
use futures::stream::{BoxStream, TryStreamExt};
use log::{debug, warn};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::{mpsc, oneshot};

type BatchReply = ExportResult<Option<Vec<UploadRecord>>>;

/// Forward-only, single-pass cursor over export rows
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch the next batch of at most `batch_size` rows, or None once exhausted
    async fn next_batch(&mut self) -> ExportResult<Option<Vec<UploadRecord>>>;
}

/// Source of export rows. Opening a cursor runs the filtered query.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn open_cursor(&self, query: &UploadQuery, batch_size: usize) -> ExportResult<Box<dyn RowCursor>>;
}

/// Column projection read by exports
#[derive(Debug, FromRow)]
struct ExportRow {
    id: String,
    name: String,
    remote_url: String,
    created_at: String,
}

impl ExportRow {
    fn into_record(self) -> ExportResult<UploadRecord> {
        let decode = |e: crate::errors::DomainError| ExportError::Query(format!("Undecodable upload row: {}", e));
        Ok(UploadRecord {
            id: parse_uuid(&self.id).map_err(decode)?,
            name: self.name,
            remote_url: self.remote_url,
            created_at: parse_timestamp(&self.created_at, "created_at").map_err(decode)?,
        })
    }
}

/// Build the single export query: projected columns, search filter, stable order
fn build_export_query(filter: &UploadQuery) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new("SELECT id, name, remote_url, created_at FROM uploads");
    push_upload_filter(&mut builder, filter);
    push_upload_order(&mut builder, filter);
    builder
}

/// Read up to `batch_size` rows off the open result stream
async fn read_batch(
    rows: &mut BoxStream<'_, Result<ExportRow, sqlx::Error>>,
    batch_size: usize,
) -> ExportResult<Vec<UploadRecord>> {
    let mut batch = Vec::with_capacity(batch_size);
    while batch.len() < batch_size {
        match rows.try_next().await? {
            Some(row) => batch.push(row.into_record()?),
            None => break,
        }
    }
    Ok(batch)
}

/// SQLite row source. One query per export, streamed off a single connection.
#[derive(Debug, Clone)]
pub struct SqliteRowSource {
    pool: SqlitePool,
}

impl SqliteRowSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowSource for SqliteRowSource {
    async fn open_cursor(&self, query: &UploadQuery, batch_size: usize) -> ExportResult<Box<dyn RowCursor>> {
        let batch_size = batch_size.max(1);
        // One request in flight at a time: the reader never runs more than one batch ahead
        let (request_tx, mut request_rx) = mpsc::channel::<oneshot::Sender<BatchReply>>(1);
        let pool = self.pool.clone();
        let filter = query.clone();

        tokio::spawn(async move {
            let mut builder = build_export_query(&filter);
            let mut rows = builder.build_query_as::<ExportRow>().fetch(&pool);
            let mut exhausted = false;
            let mut fetched: u64 = 0;

            while let Some(reply) = request_rx.recv().await {
                if exhausted {
                    let _ = reply.send(Ok(None));
                    continue;
                }
                match read_batch(&mut rows, batch_size).await {
                    Ok(batch) => {
                        exhausted = batch.len() < batch_size;
                        fetched += batch.len() as u64;
                        debug!("Fetched batch of {} uploads (total: {})", batch.len(), fetched);
                        let answer = if batch.is_empty() { None } else { Some(batch) };
                        if reply.send(Ok(answer)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Upload export query failed after {} rows: {}", fetched, e);
                        let _ = reply.send(Err(e));
                        break;
                    }
                }
            }
            // Dropping `rows` here releases the connection
        });

        let mut cursor = SqliteRowCursor {
            requests: request_tx,
            pending: None,
            finished: false,
        };
        // Pull the first batch now so a rejected query fails the open
        cursor.pending = cursor.request().await?;
        cursor.finished = cursor.pending.is_none();
        Ok(Box::new(cursor))
    }
}

/// Cursor handed out by SqliteRowSource
pub struct SqliteRowCursor {
    requests: mpsc::Sender<oneshot::Sender<BatchReply>>,
    pending: Option<Vec<UploadRecord>>,
    finished: bool,
}

impl SqliteRowCursor {
    async fn request(&mut self) -> BatchReply {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .await
            .map_err(|_| ExportError::Query("Row reader stopped before the cursor was exhausted".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ExportError::Query("Row reader ended without answering".to_string()))?
    }
}

#[async_trait]
impl RowCursor for SqliteRowCursor {
    async fn next_batch(&mut self) -> ExportResult<Option<Vec<UploadRecord>>> {
        if let Some(batch) = self.pending.take() {
            return Ok(Some(batch));
        }
        if self.finished {
            return Ok(None);
        }
        let batch = self.request().await?;
        self.finished = batch.is_none();
        Ok(batch)
    }
}
