use crate::audit::AuditConfig;
use crate::datasets::{default_datasets, validate_identifier, DatasetDefinition, DatasetRegistry};
use crate::procedures::{ProcedureConfig, ProcedureRegistry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub external: ExternalConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub procedures: ProcedureConfig,
    /// Dataset types in dispatch order.
    #[serde(default = "default_datasets")]
    pub datasets: Vec<DatasetDefinition>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            external: ExternalConfig::default(),
            audit: AuditConfig::default(),
            procedures: ProcedureConfig::default(),
            datasets: default_datasets(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix for every route except `/` and `/health`.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: default_api_prefix(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. Required to start the server.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(rename = "type", default = "default_storage_type")]
    pub storage_type: String,
    /// Base directory for `filesystem` backups.
    #[serde(default = "default_storage_path")]
    pub path: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

fn default_storage_type() -> String {
    "filesystem".to_string()
}

fn default_storage_path() -> String {
    "./data/raw-datasets".to_string()
}

fn default_bucket() -> String {
    "raw-datasets".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: default_storage_type(),
            path: default_storage_path(),
            bucket: default_bucket(),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            allow_http: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExternalConfig {
    /// Deadline for each database, procedure or storage call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl ExternalConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from an optional file and environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Add environment variables with prefix ETL_
        // Example: ETL_SERVER__PORT=8080, ETL_DATABASE__URL=postgres://...
        builder = builder.add_source(
            config::Environment::with_prefix("ETL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("database.url is required");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        if self.external.call_timeout_secs == 0 {
            anyhow::bail!("external.call_timeout_secs must be at least 1");
        }
        let prefix = &self.server.api_prefix;
        if !prefix.starts_with('/') || prefix.ends_with('/') {
            anyhow::bail!(
                "server.api_prefix must start with '/' and not end with one, got '{}'",
                prefix
            );
        }

        // Credentialed CORS cannot use the `*` wildcard.
        if self.server.cors_origins.iter().any(|o| o.trim() == "*") {
            anyhow::bail!("server.cors_origins cannot contain '*'; list each origin explicitly");
        }

        match self.storage.storage_type.as_str() {
            "s3" => {
                if self.storage.bucket.is_empty() {
                    anyhow::bail!("S3 storage requires 'bucket'");
                }
            }
            "filesystem" => {
                if self.storage.path.is_empty() {
                    anyhow::bail!("Filesystem storage requires 'path'");
                }
            }
            _ => anyhow::bail!("Invalid storage type: {}", self.storage.storage_type),
        }

        for (key, table) in [
            ("audit.master_table", &self.audit.master_table),
            ("audit.error_table", &self.audit.error_table),
        ] {
            validate_identifier(table).with_context(|| format!("Invalid {}", key))?;
        }

        let datasets = self.dataset_registry()?;
        ProcedureRegistry::new(&self.procedures, &datasets)
            .context("Invalid procedure configuration")?;

        Ok(())
    }

    pub fn dataset_registry(&self) -> Result<DatasetRegistry> {
        DatasetRegistry::new(self.datasets.clone()).context("Invalid dataset configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                url: Some("postgres://etl@localhost/warehouse".to_string()),
                ..DatabaseConfig::default()
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.api_prefix, "/api");
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.external.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.storage.storage_type, "filesystem");
        assert_eq!(config.datasets.len(), 5);
    }

    #[test]
    fn test_validate_requires_database_url() {
        assert!(AppConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_storage() {
        let mut config = valid();
        config.storage.storage_type = "ftp".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_wildcard_cors_origin() {
        let mut config = valid();
        config.server.cors_origins = vec!["*".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cors_origins"));
    }

    #[test]
    fn test_validate_rejects_invalid_audit_table() {
        let mut config = valid();
        config.audit.error_table = "garbage logs".to_string();
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("audit.error_table"));

        let mut config = valid();
        config.audit.master_table = "select".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unlisted_procedure() {
        let mut config = valid();
        config.procedures.allowed.retain(|p| p != "sp_load_sales");
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("sp_load_sales"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8080

[database]
url = "postgres://etl@db/warehouse"

[external]
call_timeout_secs = 5

[[datasets]]
name = "airlines"
table = "raw_airlines"
required_columns = ["AirlineKey", "AirlineName"]

[datasets.procedures]
clean = "sp_clean_airlines"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.external.call_timeout_secs, 5);
        assert_eq!(config.datasets.len(), 1);
        assert_eq!(
            config.datasets[0].procedures.clean.as_deref(),
            Some("sp_clean_airlines")
        );
        assert_eq!(config.datasets[0].procedures.load, None);
        assert!(config.validate().is_ok());
    }
}
