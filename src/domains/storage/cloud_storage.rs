use super::{object_url, sanitize_component, ObjectStorage, StorageError, StorageResult, StorageUpload, UploadedObject};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client};
use std::time::Duration;

/// Object storage behind an HTTP API accepting `PUT <endpoint>/<bucket>/<folder>/<file>`.
///
/// The body is streamed straight into the request. If the stream yields an
/// error the request is aborted and the server never sees a complete object.
pub struct HttpObjectStorage {
    client: Client,
    endpoint: String,
    bucket: String,
    access_token: Option<String>,
    public_base_url: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        access_token: Option<String>,
        public_base_url: Option<String>,
    ) -> StorageResult<Self> {
        if endpoint.trim().is_empty() {
            return Err(StorageError::Configuration("storage endpoint is empty".to_string()));
        }
        sanitize_component(bucket).map_err(|_| StorageError::Configuration(format!("invalid bucket name: {:?}", bucket)))?;

        // No overall timeout: large exports stream for as long as the producer needs
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StorageError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            access_token,
            public_base_url,
        })
    }

    fn put_url(&self, folder: &str, file_name: &str) -> String {
        object_url(&format!("{}/{}", self.endpoint, self.bucket), folder, file_name)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, upload: StorageUpload) -> StorageResult<UploadedObject> {
        let key = upload.key();
        let folder = sanitize_component(&upload.folder)?;
        let file_name = sanitize_component(&upload.file_name)?;
        let url = self.put_url(folder, file_name);

        info!("[STORAGE] PUT {}", key);
        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, upload.content_type.as_str());
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let public_url = match &self.public_base_url {
            Some(base) => object_url(base, folder, file_name),
            None => url.clone(),
        };

        let response = request
            .body(Body::wrap_stream(upload.body))
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("Upload of {} failed: {}", key, e)))?;

        let status = response.status();
        debug!("[STORAGE] PUT {} -> {}", key, status.as_u16());

        if status.is_success() {
            Ok(UploadedObject { key, url: public_url })
        } else {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Unable to get error details".to_string());
            warn!("[STORAGE] Upload of {} rejected: {} {}", key, status, error_text);
            Err(StorageError::Rejected { status: status.as_u16(), message: error_text })
        }
    }
}
