use crate::domains::export::repository::RowCursor;
use crate::domains::export::types::*;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Turns a batch cursor into a stream of single rows.
///
/// The next batch is only requested once every row of the current one has been
/// pulled downstream, so at most one batch is held at a time.
pub struct RowFlattener {
    cursor: Box<dyn RowCursor>,
    peak_batch_rows: Arc<AtomicUsize>,
}

impl RowFlattener {
    pub fn new(cursor: Box<dyn RowCursor>) -> Self {
        Self {
            cursor,
            peak_batch_rows: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Largest batch seen so far; readable while the stream runs
    pub fn peak_batch_rows(&self) -> Arc<AtomicUsize> {
        self.peak_batch_rows.clone()
    }

    /// Rows in cursor order. The first cursor error ends the stream.
    pub fn into_stream(self) -> BoxStream<'static, ExportResult<UploadRecord>> {
        let peak = self.peak_batch_rows;
        stream::try_unfold(self.cursor, move |mut cursor| {
            let peak = peak.clone();
            async move {
                match cursor.next_batch().await? {
                    Some(batch) => {
                        peak.fetch_max(batch.len(), Ordering::Relaxed);
                        let rows = stream::iter(batch.into_iter().map(Ok::<UploadRecord, ExportError>));
                        Ok::<_, ExportError>(Some((rows, cursor)))
                    }
                    None => Ok(None),
                }
            }
        })
        .try_flatten()
        .boxed()
    }
}
