pub mod export;
pub mod storage;
pub mod upload;

pub use export::{ExportService, ExportSummary};
pub use upload::{UploadService, UploadServiceImpl};
