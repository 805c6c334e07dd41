use crate::domains::export::types::*;
use crate::domains::storage::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// `<RFC3339 with millis>-uploads.csv`, e.g. `2025-06-01T10:00:00.000Z-uploads.csv`
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.to_rfc3339_opts(SecondsFormat::Millis, true), EXPORT_FILE_SUFFIX)
}

/// Bounded byte pipe between the encoder and a storage upload.
///
/// The writer side blocks once `capacity` chunks are waiting, so the encoder
/// never runs ahead of the upload by more than that. The body ends cleanly
/// only after [`SinkWriter::finish`]; if the writer is dropped first the body
/// yields an error so storage discards the partial object.
pub fn upload_sink(capacity: usize) -> (SinkWriter, SinkBody) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let finished = Arc::new(AtomicBool::new(false));
    let drained = Arc::new(AtomicBool::new(false));
    (
        SinkWriter { tx, finished: finished.clone() },
        SinkBody { rx, finished, drained },
    )
}

pub struct SinkWriter {
    tx: mpsc::Sender<Bytes>,
    finished: Arc<AtomicBool>,
}

impl SinkWriter {
    /// Hand one chunk to the upload, waiting while the buffer is full
    pub async fn write_chunk(&self, chunk: Bytes) -> ExportResult<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| ExportError::Storage("Upload stopped reading the export body".to_string()))
    }

    /// Mark the document complete and close the body
    pub fn finish(self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

pub struct SinkBody {
    rx: mpsc::Receiver<Bytes>,
    finished: Arc<AtomicBool>,
    drained: Arc<AtomicBool>,
}

impl SinkBody {
    /// Handle reporting whether the body was read to its clean end
    pub fn completion(&self) -> SinkCompletion {
        SinkCompletion { drained: self.drained.clone() }
    }

    pub fn into_stream(self) -> ByteStream {
        let SinkBody { rx, finished, drained } = self;
        stream::unfold(Some(rx), move |state| {
            let finished = finished.clone();
            let drained = drained.clone();
            async move {
                let mut rx = state?;
                match rx.recv().await {
                    Some(chunk) => Some((Ok(chunk), Some(rx))),
                    None if finished.load(Ordering::SeqCst) => {
                        drained.store(true, Ordering::SeqCst);
                        None
                    }
                    None => Some((
                        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "export aborted before the document was complete")),
                        None,
                    )),
                }
            }
        })
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct SinkCompletion {
    drained: Arc<AtomicBool>,
}

impl SinkCompletion {
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }
}
