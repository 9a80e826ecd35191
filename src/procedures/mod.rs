//! Stored procedures the service is allowed to trigger.
//!
//! Procedure names are never assembled at request time. Every
//! `(action, dataset type)` pair maps to a configured name, and every
//! configured name must appear in the allow-list and be a plain identifier.
//! Both checks run once, when the registry is built at startup.

pub mod dispatcher;

pub use dispatcher::{BatchDispatcher, BatchOutcome, OutcomeStatus};

use crate::datasets::{validate_identifier, DatasetRegistry, IdentifierError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Per-dataset batch actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Clean,
    Load,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Load => "load",
        }
    }
}

impl std::fmt::Display for BatchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved procedure invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureCall {
    pub procedure: String,
    /// Passed as the named argument `dataset_type` when present.
    pub dataset_type: Option<String>,
}

impl ProcedureCall {
    pub fn new(procedure: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
            dataset_type: None,
        }
    }

    pub fn for_dataset(procedure: impl Into<String>, dataset_type: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
            dataset_type: Some(dataset_type.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProcedureConfig {
    /// Every procedure the service may call.
    #[serde(default = "default_allowed")]
    pub allowed: Vec<String>,
    /// Builds the denormalized reporting table.
    #[serde(default = "default_denormalize")]
    pub denormalize: String,
    /// Runs clean + load for one dataset type, taking `dataset_type`.
    #[serde(default = "default_master_pipeline")]
    pub master_pipeline: String,
}

fn default_allowed() -> Vec<String> {
    [
        "sp_clean_airlines",
        "sp_clean_airports",
        "sp_clean_flights",
        "sp_clean_sales",
        "sp_clean_passengers",
        "sp_load_airlines",
        "sp_load_airports",
        "sp_load_flights",
        "sp_load_sales",
        "sp_load_passengers",
        "sp_build_denorm_table",
        "sp_master_pipeline",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_denormalize() -> String {
    "sp_build_denorm_table".to_string()
}

fn default_master_pipeline() -> String {
    "sp_master_pipeline".to_string()
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            allowed: default_allowed(),
            denormalize: default_denormalize(),
            master_pipeline: default_master_pipeline(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcedureRegistryError {
    #[error("procedure '{procedure}' ({usage}) is not in the allow-list")]
    NotAllowed { procedure: String, usage: String },

    #[error("invalid procedure name '{procedure}': {error}")]
    InvalidName {
        procedure: String,
        error: IdentifierError,
    },
}

/// Validated mapping from actions to procedures.
#[derive(Debug, Clone)]
pub struct ProcedureRegistry {
    dataset_types: Vec<String>,
    per_dataset: HashMap<(BatchAction, String), String>,
    denormalize: String,
    master_pipeline: String,
}

impl ProcedureRegistry {
    pub fn new(
        config: &ProcedureConfig,
        datasets: &DatasetRegistry,
    ) -> Result<Self, ProcedureRegistryError> {
        let mut allowed = HashSet::with_capacity(config.allowed.len());
        for procedure in &config.allowed {
            validate_identifier(procedure).map_err(|error| {
                ProcedureRegistryError::InvalidName {
                    procedure: procedure.clone(),
                    error,
                }
            })?;
            allowed.insert(procedure.as_str());
        }

        let check = |procedure: &str, usage: String| {
            if allowed.contains(procedure) {
                Ok(())
            } else {
                Err(ProcedureRegistryError::NotAllowed {
                    procedure: procedure.to_string(),
                    usage,
                })
            }
        };

        check(&config.denormalize, "denormalize".to_string())?;
        check(&config.master_pipeline, "master pipeline".to_string())?;

        let mut per_dataset = HashMap::new();
        for dataset in datasets.datasets() {
            let mapped = [
                (BatchAction::Clean, &dataset.procedures.clean),
                (BatchAction::Load, &dataset.procedures.load),
            ];
            for (action, procedure) in mapped {
                if let Some(procedure) = procedure {
                    check(procedure, format!("{} {}", action, dataset.name))?;
                    per_dataset.insert((action, dataset.name.clone()), procedure.clone());
                }
            }
        }

        Ok(Self {
            dataset_types: datasets.names().map(String::from).collect(),
            per_dataset,
            denormalize: config.denormalize.clone(),
            master_pipeline: config.master_pipeline.clone(),
        })
    }

    /// Dataset types in dispatch order.
    pub fn dataset_types(&self) -> &[String] {
        &self.dataset_types
    }

    /// Procedure for `action` on `dataset_type`, if one is configured.
    pub fn lookup(&self, action: BatchAction, dataset_type: &str) -> Option<ProcedureCall> {
        self.per_dataset
            .get(&(action, dataset_type.to_string()))
            .map(ProcedureCall::new)
    }

    pub fn denormalize(&self) -> ProcedureCall {
        ProcedureCall::new(&self.denormalize)
    }

    pub fn master_pipeline(&self, dataset_type: &str) -> ProcedureCall {
        ProcedureCall::for_dataset(&self.master_pipeline, dataset_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::default_datasets;

    fn registry() -> ProcedureRegistry {
        ProcedureRegistry::new(&ProcedureConfig::default(), &DatasetRegistry::default()).unwrap()
    }

    #[test]
    fn test_default_mapping() {
        let registry = registry();
        assert_eq!(
            registry.lookup(BatchAction::Clean, "airlines"),
            Some(ProcedureCall::new("sp_clean_airlines"))
        );
        assert_eq!(
            registry.lookup(BatchAction::Load, "passengers"),
            Some(ProcedureCall::new("sp_load_passengers"))
        );
        assert_eq!(registry.lookup(BatchAction::Load, "cargo"), None);
    }

    #[test]
    fn test_master_pipeline_passes_dataset() {
        assert_eq!(
            registry().master_pipeline("flights"),
            ProcedureCall::for_dataset("sp_master_pipeline", "flights")
        );
    }

    #[test]
    fn test_dataset_types_follow_registry_order() {
        assert_eq!(
            registry().dataset_types(),
            ["airlines", "airports", "flights", "sales", "passengers"]
        );
    }

    #[test]
    fn test_unmapped_action_has_no_procedure() {
        let mut datasets = default_datasets();
        datasets[4].procedures.clean = None;
        let registry = ProcedureRegistry::new(
            &ProcedureConfig::default(),
            &DatasetRegistry::new(datasets).unwrap(),
        )
        .unwrap();
        assert_eq!(registry.lookup(BatchAction::Clean, "passengers"), None);
        assert!(registry.lookup(BatchAction::Load, "passengers").is_some());
    }

    #[test]
    fn test_rejects_procedure_outside_allow_list() {
        let mut datasets = default_datasets();
        datasets[0].procedures.clean = Some("sp_drop_everything".to_string());
        let err = ProcedureRegistry::new(
            &ProcedureConfig::default(),
            &DatasetRegistry::new(datasets).unwrap(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProcedureRegistryError::NotAllowed {
                procedure: "sp_drop_everything".to_string(),
                usage: "clean airlines".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_denormalize_outside_allow_list() {
        let config = ProcedureConfig {
            denormalize: "sp_other".to_string(),
            ..ProcedureConfig::default()
        };
        assert!(matches!(
            ProcedureRegistry::new(&config, &DatasetRegistry::default()),
            Err(ProcedureRegistryError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_allow_list_entry() {
        let mut config = ProcedureConfig::default();
        config.allowed.push("sp_x(); drop table raw_sales".to_string());
        assert!(matches!(
            ProcedureRegistry::new(&config, &DatasetRegistry::default()),
            Err(ProcedureRegistryError::InvalidName { .. })
        ));
    }
}
