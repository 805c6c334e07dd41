pub mod types;
pub mod repository;
pub mod service;

pub use types::{GetUploadsInput, NewUpload, Upload, UploadQuery, UploadSort, UploadSortField};
pub use repository::{SqliteUploadRepository, UploadRepository};
pub use service::{UploadService, UploadServiceImpl};
