use crate::domains::export::flatten::RowFlattener;
use crate::domains::export::repository::RowSource;
use crate::domains::export::sink::{export_file_name, upload_sink, SinkWriter};
use crate::domains::export::types::*;
use crate::domains::export::writers::{CsvChunkEncoder, CsvConfig, EncodeSummary};
use crate::domains::storage::{ObjectStorage, StorageUpload};
use crate::validation::Validate;
use chrono::Utc;
use futures::stream::{BoxStream, TryStreamExt};
use log::{debug, error, info};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Records the stage of one export and publishes every change
struct StageTracker {
    export_id: Uuid,
    stage: ExportStage,
    progress: Option<mpsc::Sender<ExportProgress>>,
    rows_written: u64,
    bytes_written: u64,
}

impl StageTracker {
    fn new(export_id: Uuid, progress: Option<mpsc::Sender<ExportProgress>>) -> Self {
        Self {
            export_id,
            stage: ExportStage::Idle,
            progress,
            rows_written: 0,
            bytes_written: 0,
        }
    }

    fn advance(&mut self, next: ExportStage) {
        if !self.stage.can_transition_to(next) {
            debug!("Export {}: ignoring transition {:?} -> {:?}", self.export_id, self.stage, next);
            return;
        }
        debug!("Export {}: {:?} -> {:?}", self.export_id, self.stage, next);
        self.stage = next;
        self.publish();
    }

    fn record(&mut self, rows_written: u64, bytes_written: u64) {
        self.rows_written = rows_written;
        self.bytes_written = bytes_written;
        self.publish();
    }

    fn publish(&self) {
        if let Some(tx) = &self.progress {
            // Slow observers miss updates; the export does not wait for them
            let _ = tx.try_send(ExportProgress {
                export_id: self.export_id,
                stage: self.stage,
                rows_written: self.rows_written,
                bytes_written: self.bytes_written,
            });
        }
    }
}

/// Runs upload exports: query, flatten, encode and upload as one concurrent pipeline
pub struct ExportService {
    row_source: Arc<dyn RowSource>,
    storage: Arc<dyn ObjectStorage>,
    config: ExportConfig,
}

impl std::fmt::Debug for ExportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportService")
            .field("row_source", &"<RowSource>")
            .field("storage", &"<ObjectStorage>")
            .field("config", &self.config)
            .finish()
    }
}

impl ExportService {
    pub fn new(
        row_source: Arc<dyn RowSource>,
        storage: Arc<dyn ObjectStorage>,
        config: ExportConfig,
    ) -> ExportResult<Self> {
        config.validate()?;
        Ok(Self { row_source, storage, config })
    }

    /// Export every upload matching the request as one CSV document and return where it landed.
    pub async fn export_uploads(&self, request: &ExportRequest) -> ExportResult<ExportSummary> {
        self.run(request, None).await
    }

    /// Same as [`export_uploads`](Self::export_uploads), publishing stage changes and
    /// running totals on `progress`.
    pub async fn export_with_progress(
        &self,
        request: &ExportRequest,
        progress: mpsc::Sender<ExportProgress>,
    ) -> ExportResult<ExportSummary> {
        self.run(request, Some(progress)).await
    }

    /// Validate a raw JSON body and export it
    pub async fn export_from_json(&self, input: serde_json::Value) -> ExportResult<ExportSummary> {
        let request = ExportRequest::parse(input)?;
        self.export_uploads(&request).await
    }

    async fn run(
        &self,
        request: &ExportRequest,
        progress: Option<mpsc::Sender<ExportProgress>>,
    ) -> ExportResult<ExportSummary> {
        let export_id = Uuid::now_v7();
        let started = Instant::now();
        let mut tracker = StageTracker::new(export_id, progress);

        info!("Export {} started (search: {:?})", export_id, request.search_query());

        match self.execute(export_id, request, &mut tracker, started).await {
            Ok(summary) => {
                tracker.advance(ExportStage::Completed);
                info!(
                    "Export {} completed: {} rows, {} bytes -> {} in {}ms",
                    export_id,
                    summary.stats.rows_written,
                    summary.stats.bytes_written,
                    summary.destination_key,
                    summary.stats.duration_ms
                );
                Ok(summary)
            }
            Err(e) => {
                tracker.advance(ExportStage::Failed);
                error!("Export {} failed ({}): {}", export_id, e.kind(), e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        export_id: Uuid,
        request: &ExportRequest,
        tracker: &mut StageTracker,
        started: Instant,
    ) -> ExportResult<ExportSummary> {
        tracker.advance(ExportStage::Querying);
        let cursor = self.row_source.open_cursor(request.query(), self.config.batch_size).await?;
        tracker.advance(ExportStage::Streaming);

        let flattener = RowFlattener::new(cursor);
        let peak_batch_rows = flattener.peak_batch_rows();
        let rows = flattener.into_stream();

        let (writer, body) = upload_sink(self.config.sink_capacity);
        let completion = body.completion();
        let upload = StorageUpload {
            folder: EXPORT_FOLDER.to_string(),
            file_name: export_file_name(Utc::now()),
            content_type: mime::TEXT_CSV.to_string(),
            body: body.into_stream(),
        };
        let destination_key = upload.key();
        debug!("Export {} streaming to {}", export_id, destination_key);

        let storage = self.storage.clone();
        let uploading = async move { storage.upload(upload).await.map_err(ExportError::from) };
        let producing = self.produce(rows, writer, tracker);

        // First failure wins; dropping the other side stops it
        let (encoded, object) = tokio::try_join!(producing, uploading)?;

        if !completion.is_drained() {
            return Err(ExportError::Storage(format!(
                "Storage confirmed {} without reading the whole document",
                destination_key
            )));
        }

        Ok(ExportSummary {
            export_id,
            report_url: object.url,
            destination_key: object.key,
            checksum: encoded.checksum,
            stats: ExportStats {
                rows_written: encoded.rows_written,
                bytes_written: encoded.bytes_written,
                chunks_written: encoded.chunks_written,
                peak_batch_rows: peak_batch_rows.load(Ordering::Relaxed),
                peak_chunk_bytes: encoded.peak_chunk_bytes,
                duration_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    /// Encode rows into chunks and push them into the sink until the source is exhausted
    async fn produce(
        &self,
        mut rows: BoxStream<'static, ExportResult<UploadRecord>>,
        writer: SinkWriter,
        tracker: &mut StageTracker,
    ) -> ExportResult<EncodeSummary> {
        let csv_config = CsvConfig {
            chunk_size: self.config.chunk_size,
            ..Default::default()
        };
        let mut encoder = CsvChunkEncoder::<UploadRecord>::new(&csv_config)?;

        while let Some(record) = rows.try_next().await? {
            if let Some(chunk) = encoder.encode(&record)? {
                writer.write_chunk(chunk).await?;
                tracker.record(encoder.rows_written(), encoder.bytes_written());
            }
        }

        let (last, summary) = encoder.finish();
        if let Some(chunk) = last {
            writer.write_chunk(chunk).await?;
        }
        writer.finish();

        tracker.record(summary.rows_written, summary.bytes_written);
        tracker.advance(ExportStage::AwaitingUploadConfirm);
        Ok(summary)
    }
}
