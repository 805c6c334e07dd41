use crate::domains::upload::repository::UploadRepository;
use crate::domains::upload::types::{GetUploadsInput, NewUpload, Upload};
use crate::errors::ServiceResult;
use crate::types::PaginatedResult;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

/// Trait defining upload service operations
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Record a file that was already stored remotely
    async fn register_upload(&self, new_upload: NewUpload) -> ServiceResult<Upload>;

    async fn get_upload(&self, id: Uuid) -> ServiceResult<Upload>;

    /// Paginated listing with the same filter and ordering the export uses
    async fn get_uploads(&self, input: GetUploadsInput) -> ServiceResult<PaginatedResult<Upload>>;
}

/// Implementation of the upload service
#[derive(Clone)]
pub struct UploadServiceImpl {
    repo: Arc<dyn UploadRepository>,
}

impl UploadServiceImpl {
    pub fn new(repo: Arc<dyn UploadRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl UploadService for UploadServiceImpl {
    async fn register_upload(&self, new_upload: NewUpload) -> ServiceResult<Upload> {
        let upload = self.repo.create(&new_upload).await?;
        debug!("Registered upload {} ({})", upload.id, upload.name);
        Ok(upload)
    }

    async fn get_upload(&self, id: Uuid) -> ServiceResult<Upload> {
        Ok(self.repo.find_by_id(id).await?)
    }

    async fn get_uploads(&self, input: GetUploadsInput) -> ServiceResult<PaginatedResult<Upload>> {
        let (query, params) = input.into_query()?;
        Ok(self.repo.find_all(&query, params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::upload::repository::tests::test_pool;
    use crate::domains::upload::repository::SqliteUploadRepository;
    use crate::errors::{DomainError, ServiceError};

    async fn service() -> UploadServiceImpl {
        UploadServiceImpl::new(Arc::new(SqliteUploadRepository::new(test_pool().await)))
    }

    fn new_upload(name: &str) -> NewUpload {
        NewUpload {
            name: name.to_string(),
            remote_key: format!("uploads/{}", name),
            remote_url: format!("https://cdn.example.com/uploads/{}", name),
        }
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let service = service().await;
        let first = service.register_upload(new_upload("cat.png")).await.unwrap();
        let second = service.register_upload(new_upload("Cat-2.png")).await.unwrap();
        service.register_upload(new_upload("dog.png")).await.unwrap();

        let input: GetUploadsInput = serde_json::from_value(serde_json::json!({
            "searchQuery": "cat",
            "sortBy": "createdAt",
            "sortDirection": "desc"
        }))
        .unwrap();
        let page = service.get_uploads(input).await.unwrap();
        let ids: Vec<Uuid> = page.items.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(page.total, 2);

        assert_eq!(service.get_upload(first.id).await.unwrap().name, "cat.png");
    }

    #[tokio::test]
    async fn test_invalid_listing_input() {
        let service = service().await;
        let input = GetUploadsInput { page_size: Some(500), ..Default::default() };
        let err = service.get_uploads(input).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_remote_key_is_rejected() {
        let service = service().await;
        service.register_upload(new_upload("a.png")).await.unwrap();
        let err = service.register_upload(new_upload("a.png")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Database(_))));
    }
}
