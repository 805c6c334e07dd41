use crate::domains::upload::types::{format_timestamp, search_key, NewUpload, Upload, UploadQuery, UploadRow};
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::{PaginatedResult, PaginationParams, SortDirection};
use crate::validation::Validate;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

/// Columns projected by every upload read
pub(crate) const UPLOAD_COLUMNS: &str = "id, name, remote_key, remote_url, created_at";

/// Appends the search filter, if any, to a query reading from `uploads`.
pub(crate) fn push_upload_filter<'q>(builder: &mut QueryBuilder<'q, Sqlite>, filter: &UploadQuery) {
    if let Some(pattern) = filter.like_pattern() {
        builder.push(" WHERE name_search LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\'");
    }
}

/// Appends the ORDER BY clause. Defaults to ascending id.
pub(crate) fn push_upload_order<'q>(builder: &mut QueryBuilder<'q, Sqlite>, filter: &UploadQuery) {
    match filter.sort {
        Some(sort) => {
            builder.push(format!(
                " ORDER BY {} {}, id {}",
                sort.field.column(),
                sort.direction.as_sql(),
                sort.direction.as_sql()
            ));
        }
        None => {
            builder.push(" ORDER BY id ");
            builder.push(SortDirection::Asc.as_sql());
        }
    }
}

/// Trait defining upload repository operations
#[async_trait]
pub trait UploadRepository: Send + Sync {
    async fn create(&self, new_upload: &NewUpload) -> DomainResult<Upload>;

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Upload>;

    async fn find_all(&self, filter: &UploadQuery, params: PaginationParams) -> DomainResult<PaginatedResult<Upload>>;
}

/// SQLite implementation of UploadRepository
#[derive(Debug, Clone)]
pub struct SqliteUploadRepository {
    pool: SqlitePool,
}

impl SqliteUploadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn entity_name() -> &'static str {
        "uploads"
    }
}

#[async_trait]
impl UploadRepository for SqliteUploadRepository {
    async fn create(&self, new_upload: &NewUpload) -> DomainResult<Upload> {
        new_upload.validate()?;

        let upload = Upload {
            id: Uuid::now_v7(),
            name: new_upload.name.clone(),
            remote_key: new_upload.remote_key.clone(),
            remote_url: new_upload.remote_url.clone(),
            created_at: Utc::now(),
        };

        query("INSERT INTO uploads (id, name, name_search, remote_key, remote_url, created_at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(upload.id.to_string())
            .bind(&upload.name)
            .bind(search_key(&upload.name))
            .bind(&upload.remote_key)
            .bind(&upload.remote_url)
            .bind(format_timestamp(&upload.created_at))
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(upload)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Upload> {
        let row = query_as::<_, UploadRow>(&format!("SELECT {} FROM uploads WHERE id = ?", UPLOAD_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DomainError::EntityNotFound(Self::entity_name().to_string(), id))?;

        row.into_entity()
    }

    async fn find_all(&self, filter: &UploadQuery, params: PaginationParams) -> DomainResult<PaginatedResult<Upload>> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM uploads");
        push_upload_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;

        let mut select_query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM uploads", UPLOAD_COLUMNS));
        push_upload_filter(&mut select_query, filter);
        push_upload_order(&mut select_query, filter);
        select_query.push(" LIMIT ");
        select_query.push_bind(params.per_page as i64);
        select_query.push(" OFFSET ");
        select_query.push_bind(params.offset() as i64);

        let rows = select_query
            .build_query_as::<UploadRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;

        let items = rows.into_iter().map(UploadRow::into_entity).collect::<DomainResult<Vec<_>>>()?;
        Ok(PaginatedResult::new(items, total as u64, params))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db_migration::run_migrations;
    use crate::domains::upload::types::{UploadSort, UploadSortField};
    use sqlx::sqlite::SqlitePoolOptions;

    /// Single-connection in-memory database with migrations applied
    pub(crate) async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    pub(crate) async fn make_upload(repo: &SqliteUploadRepository, name: &str) -> Upload {
        repo.create(&NewUpload {
            name: name.to_string(),
            remote_key: format!("uploads/{}", name),
            remote_url: format!("https://cdn.example.com/uploads/{}", name),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = SqliteUploadRepository::new(test_pool().await);
        let created = make_upload(&repo, "photo.png").await;
        let found = repo.find_by_id(created.id).await.unwrap();
        assert_eq!(found.name, "photo.png");
        assert_eq!(found.remote_url, created.remote_url);

        let missing = repo.find_by_id(Uuid::now_v7()).await;
        assert!(matches!(missing, Err(DomainError::EntityNotFound(_, _))));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let repo = SqliteUploadRepository::new(test_pool().await);
        let result = repo.create(&NewUpload {
            name: String::new(),
            remote_key: "k".to_string(),
            remote_url: "u".to_string(),
        }).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_find_all_filters_case_insensitively() {
        let repo = SqliteUploadRepository::new(test_pool().await);
        make_upload(&repo, "Holiday.webp").await;
        make_upload(&repo, "holiday-2.webp").await;
        make_upload(&repo, "work.pdf").await;
        make_upload(&repo, "100%_done.txt").await;

        let page = repo.find_all(&UploadQuery::search("HOLIDAY"), PaginationParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 2);

        // Wildcards in the term are literal
        let page = repo.find_all(&UploadQuery::search("%_"), PaginationParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "100%_done.txt");

        let page = repo.find_all(&UploadQuery::search("_"), PaginationParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_find_all_folds_non_ascii_case() {
        let repo = SqliteUploadRepository::new(test_pool().await);
        make_upload(&repo, "Über.png").await;
        make_upload(&repo, "ÉTÉ.webp").await;
        make_upload(&repo, "plain.txt").await;

        for (term, expected) in [("über", "Über.png"), ("ÜBER", "Über.png"), ("été", "ÉTÉ.webp"), ("ÉTÉ", "ÉTÉ.webp")] {
            let page = repo.find_all(&UploadQuery::search(term), PaginationParams::default()).await.unwrap();
            assert_eq!(page.total, 1, "term {:?}", term);
            assert_eq!(page.items[0].name, expected);
        }
    }

    #[tokio::test]
    async fn test_find_all_orders_and_paginates() {
        let repo = SqliteUploadRepository::new(test_pool().await);
        let mut created = Vec::new();
        for i in 0..5 {
            created.push(make_upload(&repo, &format!("file-{}.png", i)).await);
        }

        let params = PaginationParams { page: 2, per_page: 2 };
        let page = repo.find_all(&UploadQuery::default(), params).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<Uuid> = page.items.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![created[2].id, created[3].id]);

        let newest_first = UploadQuery {
            search_query: None,
            sort: Some(UploadSort { field: UploadSortField::CreatedAt, direction: SortDirection::Desc }),
        };
        let page = repo.find_all(&newest_first, PaginationParams::default()).await.unwrap();
        assert_eq!(page.items.first().map(|u| u.id), Some(created[4].id));
        assert_eq!(page.items.last().map(|u| u.id), Some(created[0].id));
    }
}
