//! Dataset registry: the ordered list of dataset types the service knows.
//!
//! Each dataset type carries its destination raw table, the required-column
//! fingerprint used to classify uploads, and the procedures that clean and
//! load it. The registry is built once from configuration and shared
//! read-only by the classifier and the batch dispatcher.

pub mod error;
pub mod validation;

pub use error::DatasetError;
pub use validation::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Procedures that run for one dataset type during the batch actions.
///
/// A missing entry means the action is not implemented for this dataset yet;
/// the dispatcher reports it as skipped.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DatasetProcedures {
    pub clean: Option<String>,
    pub load: Option<String>,
}

/// One dataset type as configured.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DatasetDefinition {
    /// Dataset type tag, e.g. `airports`. Passed to the master pipeline.
    pub name: String,
    /// Raw table that uploads of this dataset are inserted into.
    pub table: String,
    /// Columns an upload must contain (case-insensitive) to route here.
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub procedures: DatasetProcedures,
}

impl DatasetDefinition {
    fn new(name: &str, table: &str, required_columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            required_columns: required_columns.iter().map(|c| c.to_string()).collect(),
            procedures: DatasetProcedures::default(),
        }
    }

    fn with_procedures(mut self, clean: &str, load: &str) -> Self {
        self.procedures = DatasetProcedures {
            clean: Some(clean.to_string()),
            load: Some(load.to_string()),
        };
        self
    }
}

/// The airline domain's five datasets, in dispatch order.
pub fn default_datasets() -> Vec<DatasetDefinition> {
    vec![
        DatasetDefinition::new(
            "airlines",
            "raw_airlines",
            &["AirlineKey", "AirlineName", "Alliance"],
        )
        .with_procedures("sp_clean_airlines", "sp_load_airlines"),
        DatasetDefinition::new(
            "airports",
            "raw_airports",
            &["AirportKey", "AirportName", "City", "Country"],
        )
        .with_procedures("sp_clean_airports", "sp_load_airports"),
        DatasetDefinition::new(
            "flights",
            "raw_flights",
            &[
                "FlightKey",
                "AirlineKey",
                "OriginAirportKey",
                "DestinationAirportKey",
            ],
        )
        .with_procedures("sp_clean_flights", "sp_load_flights"),
        DatasetDefinition::new(
            "sales",
            "raw_sales",
            &["TransactionID", "PassengerKey", "FlightKey", "TicketPrice"],
        )
        .with_procedures("sp_clean_sales", "sp_load_sales"),
        DatasetDefinition::new(
            "passengers",
            "raw_passengers",
            &["PassengerKey", "FullName", "Email"],
        )
        .with_procedures("sp_clean_passengers", "sp_load_passengers"),
    ]
}

/// Validated, ordered set of dataset definitions.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    datasets: Vec<DatasetDefinition>,
}

impl DatasetRegistry {
    /// Build a registry, rejecting duplicate names or tables and invalid identifiers.
    ///
    /// Declaration order is preserved: it is both the batch dispatch order and
    /// the classifier's tie-break order.
    pub fn new(datasets: Vec<DatasetDefinition>) -> Result<Self, DatasetError> {
        if datasets.is_empty() {
            return Err(DatasetError::Empty);
        }

        let mut tables: HashMap<&str, &str> = HashMap::new();
        for (idx, dataset) in datasets.iter().enumerate() {
            validate_identifier(&dataset.name).map_err(|error| DatasetError::InvalidName {
                name: dataset.name.clone(),
                error,
            })?;
            validate_identifier(&dataset.table).map_err(|error| DatasetError::InvalidTable {
                dataset: dataset.name.clone(),
                table: dataset.table.clone(),
                error,
            })?;

            if datasets[..idx].iter().any(|d| d.name == dataset.name) {
                return Err(DatasetError::DuplicateName(dataset.name.clone()));
            }
            if let Some(first) = tables.insert(&dataset.table, &dataset.name) {
                return Err(DatasetError::DuplicateTable {
                    table: dataset.table.clone(),
                    first: first.to_string(),
                    second: dataset.name.clone(),
                });
            }

            if dataset
                .required_columns
                .iter()
                .all(|c| c.trim().is_empty())
            {
                return Err(DatasetError::NoRequiredColumns(dataset.name.clone()));
            }
        }

        Ok(Self { datasets })
    }

    pub fn datasets(&self) -> &[DatasetDefinition] {
        &self.datasets
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self {
            datasets: default_datasets(),
        }
    }
}
