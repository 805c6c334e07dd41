use super::{object_url, sanitize_component, ObjectStorage, StorageError, StorageResult, StorageUpload, UploadedObject};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Object storage on the local filesystem.
///
/// The body is written to a hidden part file next to the destination and
/// persisted into place only after the last chunk arrived. The part file is
/// removed when it is dropped unpersisted, so a failed, interrupted or
/// cancelled upload leaves nothing behind.
pub struct LocalObjectStorage {
    base_path: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStorage {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: Option<String>) -> StorageResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path, public_base_url })
    }

    fn url_for(&self, folder: &str, file_name: &str, absolute_path: &Path) -> String {
        match &self.public_base_url {
            Some(base) => object_url(base, folder, file_name),
            None => format!("file://{}", absolute_path.display()),
        }
    }

    async fn write_part(part: &NamedTempFile, upload: &mut StorageUpload) -> StorageResult<u64> {
        let mut file = fs::File::from_std(part.reopen()?);
        let mut written = 0u64;
        while let Some(chunk) = upload.body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, mut upload: StorageUpload) -> StorageResult<UploadedObject> {
        let folder = sanitize_component(&upload.folder)?.to_string();
        let file_name = sanitize_component(&upload.file_name)?.to_string();

        let dir = self.base_path.join(&folder);
        fs::create_dir_all(&dir).await?;

        let final_path = dir.join(&file_name);
        // Same directory as the destination, so persisting is a rename
        let part = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".part")
            .tempfile_in(&dir)?;

        let written = match Self::write_part(&part, &mut upload).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Discarding partial object {}: {}", upload.key(), e);
                return Err(e);
            }
        };

        part.persist(&final_path).map_err(|e| StorageError::Io(e.error))?;
        debug!("Stored {} ({} bytes) at {}", upload.key(), written, final_path.display());

        let absolute = fs::canonicalize(&final_path).await.unwrap_or(final_path);
        Ok(UploadedObject {
            key: upload.key(),
            url: self.url_for(&folder, &file_name, &absolute),
        })
    }
}
