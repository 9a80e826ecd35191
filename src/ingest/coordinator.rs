//! Drives one upload from decoded records to a raw-table insert.

use super::classifier::TableClassifier;
use super::decoder::DecodedCsv;
use super::error::{BackupWarning, IngestError, InsertError};
use crate::storage::{backup_key, BackupStore, CSV_CONTENT_TYPE};
use crate::warehouse::{bounded, RawTableSink, WarehouseError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// `None` when the file had no data rows.
    pub target_table: Option<String>,
    pub dataset_type: Option<String>,
    pub rows_decoded: usize,
    pub rows_dropped: usize,
    pub rows_inserted: u64,
    pub backup_path: Option<String>,
    pub backup_warning: Option<BackupWarning>,
}

impl IngestionReport {
    fn empty(csv: &DecodedCsv) -> Self {
        Self {
            target_table: None,
            dataset_type: None,
            rows_decoded: 0,
            rows_dropped: csv.dropped_rows(),
            rows_inserted: 0,
            backup_path: None,
            backup_warning: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionCoordinator {
    classifier: TableClassifier,
    backups: Arc<dyn BackupStore>,
    sink: Arc<dyn RawTableSink>,
    call_timeout: Duration,
}

impl IngestionCoordinator {
    pub fn new(
        classifier: TableClassifier,
        backups: Arc<dyn BackupStore>,
        sink: Arc<dyn RawTableSink>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            backups,
            sink,
            call_timeout,
        }
    }

    /// Route `csv` to its raw table, back up `content`, and insert.
    ///
    /// An unmatched header set fails before any external call. A failed
    /// backup is reported on the result and does not stop the insert.
    #[tracing::instrument(
        name = "ingest_upload",
        skip(self, csv, content),
        fields(
            etl.filename = %filename,
            etl.rows = csv.len(),
            etl.target_table = tracing::field::Empty,
        )
    )]
    pub async fn ingest(
        &self,
        csv: &DecodedCsv,
        filename: &str,
        content: Bytes,
        uploaded_at: DateTime<Utc>,
    ) -> Result<IngestionReport, IngestError> {
        if csv.is_empty() {
            info!("Upload has no data rows; nothing to insert");
            return Ok(IngestionReport::empty(csv));
        }

        let schema = self.classifier.route(csv.headers())?;
        let table = schema.table().to_string();
        tracing::Span::current().record("etl.target_table", table.as_str());
        info!("Routing {} rows to {}", csv.len(), table);

        let key = backup_key(&table, uploaded_at, filename);
        let (backup_path, backup_warning) = self.back_up(&key, content).await;

        let receipt = bounded(
            self.call_timeout,
            "raw table insert",
            self.sink.insert_records(&table, csv),
        )
        .await
        .map_err(|e| insert_error(&table, e))?;

        let rows_inserted = receipt.rows_confirmed.unwrap_or(csv.len() as u64);
        info!("Inserted {} rows into {}", rows_inserted, table);

        Ok(IngestionReport {
            target_table: Some(table),
            dataset_type: Some(schema.dataset().to_string()),
            rows_decoded: csv.len(),
            rows_dropped: csv.dropped_rows(),
            rows_inserted,
            backup_path,
            backup_warning,
        })
    }

    async fn back_up(&self, key: &str, content: Bytes) -> (Option<String>, Option<BackupWarning>) {
        let write = self.backups.put(key, content, CSV_CONTENT_TYPE);
        let message = match tokio::time::timeout(self.call_timeout, write).await {
            Ok(Ok(url)) => return (Some(url), None),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("backup upload timed out after {:?}", self.call_timeout),
        };

        let path = self.backups.object_url(key);
        warn!(path = %path, error = %message, "Backup upload failed; continuing with insert");
        (None, Some(BackupWarning { path, message }))
    }
}

fn insert_error(table: &str, error: WarehouseError) -> InsertError {
    let details = error.details().map(str::to_string);
    let message = match error {
        WarehouseError::Database { message, .. } => message,
        other => other.to_string(),
    };
    InsertError {
        table: table.to_string(),
        message,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::DatasetRegistry;
    use crate::ingest::{decode_csv, DecodeOptions, SchemaDefinition};
    use crate::storage::MemoryStorage;
    use crate::warehouse::MockWarehouse;
    use chrono::TimeZone;

    struct Harness {
        coordinator: IngestionCoordinator,
        warehouse: Arc<MockWarehouse>,
        storage: Arc<MemoryStorage>,
    }

    fn harness() -> Harness {
        let warehouse = Arc::new(MockWarehouse::new());
        let storage = Arc::new(MemoryStorage::new());
        let classifier =
            TableClassifier::new(SchemaDefinition::from_registry(&DatasetRegistry::default()));
        let coordinator = IngestionCoordinator::new(
            classifier,
            storage.clone(),
            warehouse.clone(),
            Duration::from_secs(5),
        );
        Harness {
            coordinator,
            warehouse,
            storage,
        }
    }

    fn uploaded_at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    async fn ingest(h: &Harness, content: &'static str) -> Result<IngestionReport, IngestError> {
        let csv = decode_csv(content.as_bytes(), &DecodeOptions::default()).unwrap();
        h.coordinator
            .ingest(&csv, "data.csv", Bytes::from_static(content.as_bytes()), uploaded_at())
            .await
    }

    const AIRPORTS: &str = "AirportKey,AirportName,City,Country\n\
                            1,Heathrow,London,UK\n\
                            2,Changi,Singapore,SG\n\
                            3,Narita,Tokyo,JP\n";

    #[tokio::test]
    async fn test_routes_airports_upload() {
        let h = harness();
        let report = ingest(&h, AIRPORTS).await.unwrap();

        assert_eq!(report.target_table.as_deref(), Some("raw_airports"));
        assert_eq!(report.dataset_type.as_deref(), Some("airports"));
        assert_eq!(report.rows_inserted, 3);
        assert_eq!(
            report.backup_path.as_deref(),
            Some("memory://uploads/raw_airports/1700000000000_data.csv")
        );
        assert!(report.backup_warning.is_none());
        assert_eq!(h.warehouse.inserted(), vec![("raw_airports".to_string(), 3)]);

        let (body, content_type) = h
            .storage
            .object("uploads/raw_airports/1700000000000_data.csv")
            .unwrap();
        assert_eq!(body, Bytes::from_static(AIRPORTS.as_bytes()));
        assert_eq!(content_type, "text/csv");
    }

    #[tokio::test]
    async fn test_unknown_headers_make_no_external_calls() {
        let h = harness();
        let err = ingest(&h, "Foo,Bar\n1,2\n").await.unwrap_err();

        match err {
            IngestError::Classification(e) => {
                assert_eq!(e.detected_headers, vec!["Foo", "Bar"]);
                assert_eq!(e.allowed_schemas.len(), 5);
            }
            other => panic!("expected classification error, got {other:?}"),
        }
        assert_eq!(h.storage.put_calls(), 0);
        assert_eq!(h.warehouse.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_file_skips_everything() {
        let h = harness();
        let report = ingest(&h, "AirportKey,AirportName,City,Country\n")
            .await
            .unwrap();

        assert_eq!(report.target_table, None);
        assert_eq!(report.rows_inserted, 0);
        assert_eq!(h.storage.put_calls(), 0);
        assert_eq!(h.warehouse.insert_calls(), 0);
    }

    #[tokio::test]
    async fn test_backup_failure_is_not_fatal() {
        let h = harness();
        h.storage.set_fail_writes(true);

        let report = ingest(&h, AIRPORTS).await.unwrap();

        assert_eq!(report.rows_inserted, 3);
        assert_eq!(report.backup_path, None);
        let warning = report.backup_warning.unwrap();
        assert_eq!(
            warning.path,
            "memory://uploads/raw_airports/1700000000000_data.csv"
        );
        assert_eq!(h.warehouse.insert_calls(), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_carries_upstream_message() {
        let h = harness();
        h.warehouse.fail_inserts_with(
            "column \"airportkey\" is of type integer",
            Some("Failing row contains (x)."),
        );

        let err = ingest(&h, AIRPORTS).await.unwrap_err();
        match err {
            IngestError::Insert(e) => {
                assert_eq!(e.table, "raw_airports");
                assert_eq!(e.message, "column \"airportkey\" is of type integer");
                assert_eq!(e.details.as_deref(), Some("Failing row contains (x)."));
            }
            other => panic!("expected insert error, got {other:?}"),
        }
        // Backup happens before the insert and is kept.
        assert_eq!(h.storage.put_calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_decoded_count() {
        let h = harness();
        h.warehouse.set_echo_rows(false);

        let report = ingest(&h, AIRPORTS).await.unwrap();
        assert_eq!(report.rows_inserted, 3);
    }

    #[tokio::test]
    async fn test_header_case_and_extra_columns_still_route() {
        let h = harness();
        let report = ingest(
            &h,
            "airlinekey, AIRLINENAME ,Alliance,Founded\nAA,American,oneworld,1930\n",
        )
        .await
        .unwrap();
        assert_eq!(report.target_table.as_deref(), Some("raw_airlines"));
        assert_eq!(report.rows_inserted, 1);
    }
}
