use crate::audit::{AuditReader, AuditStats};
use crate::config::{AppConfig, StorageConfig};
use crate::datasets::{default_datasets, DatasetDefinition, DatasetRegistry};
use crate::ingest::{
    decode_csv, DecodeOptions, IngestError, IngestionCoordinator, IngestionReport,
    SchemaDefinition, TableClassifier,
};
use crate::procedures::{
    BatchAction, BatchDispatcher, BatchOutcome, ProcedureConfig, ProcedureRegistry,
};
use crate::storage::{BackupStore, FilesystemStorage, S3Storage};
use crate::warehouse::{AuditSource, PostgresWarehouse, ProcedureRunner, RawTableSink, WarehouseError};
use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default deadline for each external call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// The service core: upload ingestion, batch dispatch and audit reads over
/// one warehouse and one backup store.
#[derive(Debug)]
pub struct EtlEngine {
    decode_options: DecodeOptions,
    coordinator: IngestionCoordinator,
    dispatcher: BatchDispatcher,
    audit: AuditReader,
    postgres: Option<Arc<PostgresWarehouse>>,
}

impl EtlEngine {
    /// Create a builder for more control over engine configuration.
    pub fn builder() -> EtlEngineBuilder {
        EtlEngineBuilder::new()
    }

    /// Connect to the configured warehouse and backup store.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let warehouse = Arc::new(
            PostgresWarehouse::connect(&config.database, config.audit.clone()).await?,
        );
        let backups = Self::create_backup_store(&config.storage)?;

        let mut engine = Self::builder()
            .warehouse(warehouse.clone())
            .backup_store(backups)
            .datasets(config.datasets.clone())
            .procedures(config.procedures.clone())
            .call_timeout(config.external.call_timeout())
            .build()?;
        engine.postgres = Some(warehouse);
        Ok(engine)
    }

    fn create_backup_store(config: &StorageConfig) -> Result<Arc<dyn BackupStore>> {
        match config.storage_type.as_str() {
            "filesystem" => Ok(Arc::new(FilesystemStorage::new(&config.path))),
            "s3" => {
                let Some(endpoint) = &config.endpoint else {
                    // Credentials and region from the AWS environment.
                    return Ok(Arc::new(S3Storage::new(&config.bucket)?));
                };

                // Custom endpoint (MinIO and friends) needs explicit credentials.
                let access_key = config
                    .access_key
                    .clone()
                    .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
                    .context("S3 storage with a custom endpoint requires access_key")?;
                let secret_key = config
                    .secret_key
                    .clone()
                    .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
                    .context("S3 storage with a custom endpoint requires secret_key")?;
                let allow_http = config.allow_http || endpoint.starts_with("http://");

                Ok(Arc::new(S3Storage::new_with_config(
                    &config.bucket,
                    config.region.as_deref(),
                    endpoint,
                    &access_key,
                    &secret_key,
                    allow_http,
                )?))
            }
            other => anyhow::bail!("Unsupported storage type: {}", other),
        }
    }

    /// Decode an uploaded file and route it to its raw table.
    pub async fn ingest_upload(
        &self,
        filename: &str,
        content: Bytes,
    ) -> Result<IngestionReport, IngestError> {
        let csv = decode_csv(&content, &self.decode_options)?;
        self.coordinator
            .ingest(&csv, filename, content, Utc::now())
            .await
    }

    pub async fn run_batch(&self, action: BatchAction) -> Vec<BatchOutcome> {
        self.dispatcher.run(action).await
    }

    pub async fn run_master_pipeline(&self) -> Vec<BatchOutcome> {
        self.dispatcher.run_master_pipeline().await
    }

    pub async fn denormalize(&self) -> Result<Value, WarehouseError> {
        self.dispatcher.denormalize().await
    }

    pub async fn recent_logs(
        &self,
        dataset_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Value>, WarehouseError> {
        self.audit.recent_logs(dataset_type, limit).await
    }

    pub async fn recent_errors(&self, limit: u32) -> Result<Vec<Value>, WarehouseError> {
        self.audit.recent_errors(limit).await
    }

    pub async fn audit_stats(&self) -> Result<AuditStats, WarehouseError> {
        self.audit.stats().await
    }

    /// Close the database pool, if this engine owns one.
    pub async fn shutdown(&self) {
        if let Some(postgres) = &self.postgres {
            info!("Closing warehouse connection pool");
            postgres.close().await;
        }
    }
}

/// Builder for [`EtlEngine`].
///
/// The warehouse is required. Everything else has a default: the built-in
/// datasets and procedures, a 30 second call timeout, and filesystem backups
/// under the default storage path.
#[derive(Debug)]
pub struct EtlEngineBuilder {
    sink: Option<Arc<dyn RawTableSink>>,
    runner: Option<Arc<dyn ProcedureRunner>>,
    audit_source: Option<Arc<dyn AuditSource>>,
    backups: Option<Arc<dyn BackupStore>>,
    datasets: Vec<DatasetDefinition>,
    procedures: ProcedureConfig,
    call_timeout: Duration,
    decode_options: DecodeOptions,
}

impl Default for EtlEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EtlEngineBuilder {
    pub fn new() -> Self {
        Self {
            sink: None,
            runner: None,
            audit_source: None,
            backups: None,
            datasets: default_datasets(),
            procedures: ProcedureConfig::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            decode_options: DecodeOptions::default(),
        }
    }

    /// Use one warehouse for inserts, procedures and audit reads.
    pub fn warehouse<W>(mut self, warehouse: Arc<W>) -> Self
    where
        W: RawTableSink + ProcedureRunner + AuditSource + 'static,
    {
        self.sink = Some(warehouse.clone());
        self.runner = Some(warehouse.clone());
        self.audit_source = Some(warehouse);
        self
    }

    pub fn backup_store(mut self, backups: Arc<dyn BackupStore>) -> Self {
        self.backups = Some(backups);
        self
    }

    /// Dataset types in dispatch order. Defaults to the built-in five.
    pub fn datasets(mut self, datasets: Vec<DatasetDefinition>) -> Self {
        self.datasets = datasets;
        self
    }

    pub fn procedures(mut self, procedures: ProcedureConfig) -> Self {
        self.procedures = procedures;
        self
    }

    /// Deadline for each external call. Defaults to 30 seconds.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    pub fn build(self) -> Result<EtlEngine> {
        let (Some(sink), Some(runner), Some(audit_source)) =
            (self.sink, self.runner, self.audit_source)
        else {
            anyhow::bail!("EtlEngine requires a warehouse");
        };

        let backups: Arc<dyn BackupStore> = match self.backups {
            Some(b) => b,
            None => Arc::new(FilesystemStorage::new(StorageConfig::default().path)),
        };

        let datasets =
            DatasetRegistry::new(self.datasets).context("Invalid dataset configuration")?;
        let procedures = ProcedureRegistry::new(&self.procedures, &datasets)
            .context("Invalid procedure configuration")?;

        let classifier = TableClassifier::new(SchemaDefinition::from_registry(&datasets));
        info!(
            datasets = datasets.len(),
            call_timeout = ?self.call_timeout,
            "ETL engine ready"
        );

        Ok(EtlEngine {
            decode_options: self.decode_options,
            coordinator: IngestionCoordinator::new(classifier, backups, sink, self.call_timeout),
            dispatcher: BatchDispatcher::new(runner, Arc::new(procedures), self.call_timeout),
            audit: AuditReader::new(audit_source, self.call_timeout),
            postgres: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::warehouse::MockWarehouse;

    #[test]
    fn test_builder_requires_warehouse() {
        let err = EtlEngine::builder().build().unwrap_err();
        assert!(err.to_string().contains("requires a warehouse"));
    }

    #[test]
    fn test_builder_rejects_unlisted_procedure() {
        let procedures = ProcedureConfig {
            allowed: vec!["sp_master_pipeline".to_string()],
            ..ProcedureConfig::default()
        };
        let result = EtlEngine::builder()
            .warehouse(Arc::new(MockWarehouse::new()))
            .procedures(procedures)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ingest_upload_decodes_and_routes() {
        let warehouse = Arc::new(MockWarehouse::new());
        let engine = EtlEngine::builder()
            .warehouse(warehouse.clone())
            .backup_store(Arc::new(MemoryStorage::new()))
            .build()
            .unwrap();

        let report = engine
            .ingest_upload(
                "passengers.csv",
                Bytes::from_static(b"\xEF\xBB\xBFPassengerKey,FullName,Email\n7,Ada,ada@example.com\n"),
            )
            .await
            .unwrap();

        assert_eq!(report.target_table.as_deref(), Some("raw_passengers"));
        assert_eq!(warehouse.inserted(), vec![("raw_passengers".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_ingest_upload_rejects_invalid_utf8() {
        let warehouse = Arc::new(MockWarehouse::new());
        let engine = EtlEngine::builder()
            .warehouse(warehouse.clone())
            .backup_store(Arc::new(MemoryStorage::new()))
            .build()
            .unwrap();

        let err = engine
            .ingest_upload("bad.csv", Bytes::from_static(b"AirlineKey\n\xFF\xFE\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
        assert_eq!(warehouse.insert_calls(), 0);
    }
}
