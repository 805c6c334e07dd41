use crate::domains::export::csv_record::CsvRecord;
use crate::domains::export::types::*;
use bytes::Bytes;
use log::trace;
use sha2::{Digest, Sha256};
use std::marker::PhantomData;

#[derive(Debug, Clone)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote_char: u8,
    /// Emit a chunk once this many encoded bytes are buffered
    pub chunk_size: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Totals for one encoded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub rows_written: u64,
    pub bytes_written: u64,
    pub chunks_written: u64,
    pub peak_chunk_bytes: usize,
    /// Hex SHA-256 over every emitted byte
    pub checksum: String,
}

/// Incremental CSV encoder producing ordered byte chunks.
///
/// The header row is buffered on construction so it always leads the first
/// chunk, even for a document without data rows. Fields are quoted only when
/// they contain the delimiter, a quote or a line break. Rows end with `\n`.
pub struct CsvChunkEncoder<T: CsvRecord> {
    builder: csv::WriterBuilder,
    buffer: Vec<u8>,
    chunk_size: usize,
    hasher: Sha256,
    rows_written: u64,
    bytes_written: u64,
    chunks_written: u64,
    peak_chunk_bytes: usize,
    _record: PhantomData<fn(&T)>,
}

impl<T: CsvRecord> CsvChunkEncoder<T> {
    pub fn new(config: &CsvConfig) -> ExportResult<Self> {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(config.delimiter)
            .quote(config.quote_char)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false);

        let chunk_size = config.chunk_size.max(1);
        let mut encoder = Self {
            builder,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            hasher: Sha256::new(),
            rows_written: 0,
            bytes_written: 0,
            chunks_written: 0,
            peak_chunk_bytes: 0,
            _record: PhantomData,
        };
        encoder.write_fields(&T::headers())?;
        Ok(encoder)
    }

    fn write_fields<I, F>(&mut self, fields: I) -> ExportResult<()>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut wtr = self.builder.from_writer(&mut self.buffer);
        wtr.write_record(fields)?;
        wtr.flush().map_err(|e| ExportError::Stream(e.to_string()))?;
        Ok(())
    }

    /// Encode one row. Returns a chunk when the buffer reached the chunk size.
    pub fn encode(&mut self, record: &T) -> ExportResult<Option<Bytes>> {
        self.write_fields(record.to_csv())?;
        self.rows_written += 1;

        if self.buffer.len() >= self.chunk_size {
            return Ok(Some(self.take_chunk()));
        }
        Ok(None)
    }

    fn take_chunk(&mut self) -> Bytes {
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.hasher.update(&chunk);
        self.bytes_written += chunk.len() as u64;
        self.chunks_written += 1;
        self.peak_chunk_bytes = self.peak_chunk_bytes.max(chunk.len());
        trace!("Encoded chunk {} ({} bytes)", self.chunks_written, chunk.len());
        Bytes::from(chunk)
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush what is left. The last chunk is None only when everything was already emitted.
    pub fn finish(mut self) -> (Option<Bytes>, EncodeSummary) {
        let last = if self.buffer.is_empty() { None } else { Some(self.take_chunk()) };
        let summary = EncodeSummary {
            rows_written: self.rows_written,
            bytes_written: self.bytes_written,
            chunks_written: self.chunks_written,
            peak_chunk_bytes: self.peak_chunk_bytes,
            checksum: hex::encode(self.hasher.finalize()),
        };
        (last, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn upload(name: &str) -> UploadRecord {
        UploadRecord {
            id: Uuid::now_v7(),
            name: name.to_string(),
            remote_url: format!("https://cdn.example.com/{}", name),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    fn encode_all(records: &[UploadRecord], config: &CsvConfig) -> (Vec<Bytes>, EncodeSummary) {
        let mut encoder = CsvChunkEncoder::<UploadRecord>::new(config).unwrap();
        let mut chunks = Vec::new();
        for record in records {
            if let Some(chunk) = encoder.encode(record).unwrap() {
                chunks.push(chunk);
            }
        }
        let (last, summary) = encoder.finish();
        chunks.extend(last);
        (chunks, summary)
    }

    fn joined(chunks: &[Bytes]) -> String {
        String::from_utf8(chunks.iter().flat_map(|c| c.iter().copied()).collect()).unwrap()
    }

    #[test]
    fn test_header_only_document() {
        let (chunks, summary) = encode_all(&[], &CsvConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(joined(&chunks), "ID,Name,URL,Uploaded at\n");
        assert_eq!(summary.rows_written, 0);
        assert_eq!(summary.chunks_written, 1);
    }

    #[test]
    fn test_one_line_per_record_plus_header() {
        let records: Vec<_> = (0..5).map(|i| upload(&format!("{}.webp", i))).collect();
        let (chunks, summary) = encode_all(&records, &CsvConfig::default());
        let text = joined(&chunks);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "ID,Name,URL,Uploaded at");
        assert_eq!(
            lines[1],
            format!("{},0.webp,https://cdn.example.com/0.webp,2024-06-01T12:00:00.000Z", records[0].id)
        );
        assert!(!text.contains('\r'));
        assert_eq!(summary.rows_written, 5);
        assert_eq!(summary.bytes_written as usize, text.len());
    }

    #[test]
    fn test_special_characters_survive_a_parse() {
        let tricky = [
            ("comma, here.png", "https://cdn.example.com/a,b.png?x=1,2"),
            ("say \"cheese\".jpg", "https://cdn.example.com/\"q\".jpg"),
            ("two\nlines.txt", "https://cdn.example.com/two\nlines.txt"),
            ("plain.gif", "https://cdn.example.com/plain.gif"),
            ("ünïcödé.webp", "https://cdn.example.com/ünïcödé.webp"),
            (" padded ", "https://cdn.example.com/%20padded%20"),
        ];
        let records: Vec<UploadRecord> = tricky
            .iter()
            .enumerate()
            .map(|(i, (name, url))| UploadRecord {
                id: Uuid::now_v7(),
                name: name.to_string(),
                remote_url: url.to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, i as u32).unwrap()
                    + chrono::Duration::milliseconds(123),
            })
            .collect();
        let (chunks, _) = encode_all(&records, &CsvConfig::default());
        let text = joined(&chunks);

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
        assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), vec!["ID", "Name", "URL", "Uploaded at"]);
        let parsed: Vec<UploadRecord> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                UploadRecord {
                    id: Uuid::parse_str(&r[0]).unwrap(),
                    name: r[1].to_string(),
                    remote_url: r[2].to_string(),
                    created_at: DateTime::parse_from_rfc3339(&r[3]).unwrap().with_timezone(&Utc),
                }
            })
            .collect();
        assert_eq!(parsed, records);
        assert!(text.contains("\"say \"\"cheese\"\".jpg\""));
    }

    #[test]
    fn test_chunks_respect_chunk_size_and_hash_everything() {
        let config = CsvConfig { chunk_size: 1024, ..Default::default() };
        let records: Vec<_> = (0..500).map(|i| upload(&format!("picture-{}.png", i))).collect();
        let (chunks, summary) = encode_all(&records, &config);

        assert!(chunks.len() > 1);
        assert_eq!(summary.chunks_written as usize, chunks.len());
        // A chunk overshoots by at most one row
        assert!(summary.peak_chunk_bytes < 1024 + 256);
        assert!(joined(&chunks[..1]).starts_with("ID,Name,URL,Uploaded at\n"));

        let mut hasher = Sha256::new();
        for chunk in &chunks {
            hasher.update(chunk);
        }
        assert_eq!(summary.checksum, hex::encode(hasher.finalize()));
        assert_eq!(joined(&chunks).lines().count(), 501);
    }
}
