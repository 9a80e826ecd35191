// src/storage/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

pub mod filesystem;
pub mod memory;
pub mod s3;

// Re-exports
pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// Content type recorded on backup objects.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Blob store that keeps the original bytes of every routed upload.
#[async_trait]
pub trait BackupStore: Debug + Send + Sync {
    /// Full URL of an object key, e.g. `s3://raw-datasets/uploads/...`.
    fn object_url(&self, key: &str) -> String;

    /// Write `data` under `key` and return the object's URL.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String>;
}

/// Object key for the backup copy of an upload:
/// `uploads/{table}/{unix_millis}_{filename}`.
///
/// Path separators and control characters in the client-supplied filename
/// are replaced so the key always stays under the table's prefix.
pub fn backup_key(table: &str, uploaded_at: DateTime<Utc>, filename: &str) -> String {
    let name: String = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    let name = match name.trim() {
        "" | "." | ".." => "upload.csv",
        trimmed => trimmed,
    };
    format!(
        "uploads/{}/{}_{}",
        table,
        uploaded_at.timestamp_millis(),
        name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()
    }

    #[test]
    fn test_backup_key_layout() {
        assert_eq!(
            backup_key("raw_airports", at(), "airports.csv"),
            "uploads/raw_airports/1700000000123_airports.csv"
        );
    }

    #[test]
    fn test_backup_key_strips_directories() {
        assert_eq!(
            backup_key("raw_sales", at(), "../../etc/sales.csv"),
            "uploads/raw_sales/1700000000123_sales.csv"
        );
        assert_eq!(
            backup_key("raw_sales", at(), "C:\\exports\\sales.csv"),
            "uploads/raw_sales/1700000000123_sales.csv"
        );
    }

    #[test]
    fn test_backup_key_placeholder_for_empty_name() {
        assert_eq!(
            backup_key("raw_flights", at(), ""),
            "uploads/raw_flights/1700000000123_upload.csv"
        );
        assert_eq!(
            backup_key("raw_flights", at(), "dir/.."),
            "uploads/raw_flights/1700000000123_upload.csv"
        );
    }
}
