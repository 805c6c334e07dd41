use crate::errors::{DomainError, DomainResult, ValidationError};
use crate::types::{PaginationParams, SortDirection};
use crate::validation::{Validate, ValidationBuilder};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Longest accepted upload name, in characters
pub const MAX_NAME_LEN: usize = 255;

/// Columns an upload listing or export can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadSortField {
    CreatedAt,
}

impl UploadSortField {
    pub fn column(&self) -> &'static str {
        match self {
            UploadSortField::CreatedAt => "created_at",
        }
    }

    pub fn all_variants() -> Vec<&'static str> {
        vec!["createdAt"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSort {
    pub field: UploadSortField,
    pub direction: SortDirection,
}

/// Filter and ordering shared by the paginated listing and the export cursor.
///
/// With no `sort`, rows come back ascending by `id`. Ids are UUID v7, so that
/// is also insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadQuery {
    pub search_query: Option<String>,
    pub sort: Option<UploadSort>,
}

impl UploadQuery {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search_query: Some(term.into()),
            sort: None,
        }
    }

    /// The search term if it would actually filter anything.
    pub fn effective_search(&self) -> Option<&str> {
        self.search_query
            .as_deref()
            .filter(|term| !term.is_empty())
    }

    /// `LIKE` pattern for a literal substring match against `name_search`.
    /// Used with `ESCAPE '\'`.
    pub fn like_pattern(&self) -> Option<String> {
        self.effective_search().map(|term| {
            let mut pattern = String::with_capacity(term.len() + 2);
            pattern.push('%');
            for c in search_key(term).chars() {
                if matches!(c, '%' | '_' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
    }
}

/// Case-folded form of a name, stored in `name_search`.
///
/// SQLite's `LOWER` and `LIKE` only fold ASCII, so names and search terms are
/// both folded here instead.
pub fn search_key(value: &str) -> String {
    value.to_lowercase()
}

/// Upload entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: Uuid,
    pub name: String,
    pub remote_key: String,
    pub remote_url: String,
    pub created_at: DateTime<Utc>,
}

/// NewUpload DTO - used when registering a stored file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUpload {
    pub name: String,
    pub remote_key: String,
    pub remote_url: String,
}

impl Validate for NewUpload {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationBuilder::new("name", Some(self.name.clone()))
            .required()
            .max_length(MAX_NAME_LEN)
            .validate()?;
        ValidationBuilder::new("remote_key", Some(self.remote_key.clone()))
            .required()
            .validate()?;
        ValidationBuilder::new("remote_url", Some(self.remote_url.clone()))
            .required()
            .validate()
    }
}

/// UploadRow - SQLite row representation for mapping from database
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub id: String,
    pub name: String,
    pub remote_key: String,
    pub remote_url: String,
    pub created_at: String,
}

impl UploadRow {
    pub fn into_entity(self) -> DomainResult<Upload> {
        Ok(Upload {
            id: parse_uuid(&self.id)?,
            name: self.name,
            remote_key: self.remote_key,
            remote_url: self.remote_url,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}

pub(crate) fn parse_uuid(value: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| DomainError::InvalidUuid(value.to_string()))
}

pub(crate) fn parse_timestamp(value: &str, field_name: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DomainError::Validation(ValidationError::format(field_name, &format!("Invalid RFC3339 format: {}", value))))
}

/// Storage format for timestamps. Fixed width so text order is time order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Input for the paginated listing, as received from a client.
/// Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUploadsInput {
    pub search_query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl GetUploadsInput {
    /// Validates the raw input and turns it into a query plus pagination.
    ///
    /// A sort direction without a sort column is ignored, keeping the
    /// default id ordering.
    pub fn into_query(self) -> Result<(UploadQuery, PaginationParams), ValidationError> {
        ValidationBuilder::new("sortBy", self.sort_by.clone())
            .one_of(&UploadSortField::all_variants(), Some("must be createdAt"))
            .validate()?;
        ValidationBuilder::new("sortDirection", self.sort_direction.clone())
            .one_of(&["asc", "desc"], Some("must be asc or desc"))
            .validate()?;

        let params = PaginationParams {
            page: self.page.unwrap_or(1),
            per_page: self.page_size.unwrap_or(20),
        };
        ValidationBuilder::new("page", Some(params.page)).min(1).validate()?;
        ValidationBuilder::new("pageSize", Some(params.per_page)).range(1, 100).validate()?;

        let direction = match self.sort_direction.as_deref() {
            Some("desc") => Some(SortDirection::Desc),
            Some(_) => Some(SortDirection::Asc),
            None => None,
        };
        let sort = self.sort_by.as_ref().map(|_| UploadSort {
            field: UploadSortField::CreatedAt,
            direction: direction.unwrap_or_default(),
        });

        let query = UploadQuery {
            search_query: self.search_query,
            sort,
        };
        Ok((query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        let query = UploadQuery::search("50%_Off\\");
        assert_eq!(query.like_pattern().as_deref(), Some("%50\\%\\_off\\\\%"));

        assert_eq!(UploadQuery::search("").like_pattern(), None);
        assert_eq!(UploadQuery::default().like_pattern(), None);
    }

    #[test]
    fn test_row_into_entity() {
        let id = Uuid::now_v7();
        let row = UploadRow {
            id: id.to_string(),
            name: "cat.webp".to_string(),
            remote_key: "uploads/cat.webp".to_string(),
            remote_url: "https://cdn.example.com/uploads/cat.webp".to_string(),
            created_at: "2025-03-01T10:20:30.456Z".to_string(),
        };
        let upload = row.into_entity().unwrap();
        assert_eq!(upload.id, id);
        assert_eq!(format_timestamp(&upload.created_at), "2025-03-01T10:20:30.456Z");

        let bad = UploadRow {
            id: "nope".to_string(),
            name: String::new(),
            remote_key: String::new(),
            remote_url: String::new(),
            created_at: String::new(),
        };
        assert!(matches!(bad.into_entity(), Err(DomainError::InvalidUuid(_))));
    }

    #[test]
    fn test_get_uploads_input() {
        let input: GetUploadsInput = serde_json::from_str(
            r#"{"searchQuery":"cat","sortBy":"createdAt","sortDirection":"desc","page":2}"#,
        ).unwrap();
        let (query, params) = input.into_query().unwrap();
        assert_eq!(query.search_query.as_deref(), Some("cat"));
        assert_eq!(query.sort, Some(UploadSort { field: UploadSortField::CreatedAt, direction: SortDirection::Desc }));
        assert_eq!(params, PaginationParams { page: 2, per_page: 20 });

        // Column without direction sorts ascending; direction without column is ignored
        let input = GetUploadsInput { sort_by: Some("createdAt".to_string()), ..Default::default() };
        assert_eq!(
            input.into_query().unwrap().0.sort,
            Some(UploadSort { field: UploadSortField::CreatedAt, direction: SortDirection::Asc })
        );
        let input = GetUploadsInput { sort_direction: Some("desc".to_string()), ..Default::default() };
        assert_eq!(input.into_query().unwrap().0.sort, None);

        let input = GetUploadsInput { sort_by: Some("name".to_string()), ..Default::default() };
        assert!(input.into_query().is_err());

        let input = GetUploadsInput { page: Some(0), ..Default::default() };
        assert!(input.into_query().is_err());

        // Any string is a valid search term; unknown keys are dropped
        let input: GetUploadsInput = serde_json::from_value(serde_json::json!({
            "searchQuery": format!("a\tb{}", "x".repeat(300)),
            "cursor": "ignored"
        }))
        .unwrap();
        let (query, _) = input.into_query().unwrap();
        assert!(query.search_query.unwrap().starts_with("a\tb"));
    }
}
