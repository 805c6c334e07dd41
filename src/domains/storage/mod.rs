pub mod cloud_storage;
pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

pub use cloud_storage::HttpObjectStorage;
pub use local::LocalObjectStorage;

/// Streamed request body. An `Err` item means the producer gave up and the
/// object must not be committed.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid path component: {0}")]
    InvalidPathComponent(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Server returned error {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One object to store, delivered as a stream of chunks
pub struct StorageUpload {
    pub folder: String,
    pub file_name: String,
    pub content_type: String,
    pub body: ByteStream,
}

impl StorageUpload {
    /// Storage key: `<folder>/<file_name>`
    pub fn key(&self) -> String {
        format!("{}/{}", self.folder, self.file_name)
    }
}

/// Where a committed object can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub key: String,
    pub url: String,
}

/// Object storage able to take a streamed body.
///
/// Implementations read `body` to its end before committing. If the body
/// yields an error the object is discarded and the upload fails.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, upload: StorageUpload) -> StorageResult<UploadedObject>;
}

/// Rejects empty components and anything that could escape the folder
pub(crate) fn sanitize_component(component: &str) -> StorageResult<&str> {
    if component.is_empty() || component.contains('/') || component.contains('\\') || component == "." || component == ".." {
        Err(StorageError::InvalidPathComponent(component.to_string()))
    } else {
        Ok(component)
    }
}

/// `<base>/<folder>/<file_name>` with each key segment percent-encoded
pub(crate) fn object_url(base: &str, folder: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(folder),
        urlencoding::encode(file_name)
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component() {
        assert!(sanitize_component("downloads").is_ok());
        assert!(sanitize_component("2025-06-01T10:00:00.000Z-uploads.csv").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(sanitize_component(bad), Err(StorageError::InvalidPathComponent(_))));
        }
    }

    #[test]
    fn test_object_url_encodes_segments() {
        assert_eq!(
            object_url("https://cdn.example.com/", "downloads", "2025-06-01T10:00:00.000Z-uploads.csv"),
            "https://cdn.example.com/downloads/2025-06-01T10%3A00%3A00.000Z-uploads.csv"
        );
    }
}
