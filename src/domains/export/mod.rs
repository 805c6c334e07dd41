pub mod types;
pub mod csv_record;
pub mod repository;
pub mod flatten;
pub mod writers;
pub mod sink;
pub mod service;

pub use types::{
    ExportConfig, ExportError, ExportProgress, ExportRequest, ExportResult, ExportStage, ExportStats,
    ExportSummary, UploadRecord,
};
pub use repository::{RowCursor, RowSource, SqliteRowSource};
pub use flatten::RowFlattener;
pub use writers::{CsvChunkEncoder, CsvConfig};
pub use sink::{export_file_name, upload_sink, SinkBody, SinkWriter};
pub use service::ExportService;
pub use csv_record::CsvRecord;
