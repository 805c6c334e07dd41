use chrono::{DateTime, SecondsFormat, Utc};
use crate::domains::export::types::UploadRecord;

/// Trait for types that can be exported to CSV
pub trait CsvRecord {
    /// Get CSV headers for this type, in column order
    fn headers() -> Vec<&'static str>;

    /// Convert to CSV row, fields in the same order as `headers`
    fn to_csv(&self) -> Vec<String>;
}

// Helper for datetime formatting
pub fn csv_datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Column order of the uploads report: id, name, remote url, creation time
impl CsvRecord for UploadRecord {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Name", "URL", "Uploaded at"]
    }

    fn to_csv(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.remote_url.clone(),
            csv_datetime_to_string(&self.created_at),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_upload_record_columns() {
        let record = UploadRecord {
            id: Uuid::nil(),
            name: "a,b.png".to_string(),
            remote_url: "https://cdn.example.com/a.png".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        };
        assert_eq!(UploadRecord::headers().len(), record.to_csv().len());
        assert_eq!(
            record.to_csv(),
            vec![
                "00000000-0000-0000-0000-000000000000",
                "a,b.png",
                "https://cdn.example.com/a.png",
                "2025-01-02T03:04:05.000Z",
            ]
        );
    }
}
