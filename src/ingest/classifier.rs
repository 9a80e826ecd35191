//! Routes an uploaded file to its destination table by header shape.
//!
//! Each configured dataset declares a set of required columns. A file matches
//! a schema when its (trimmed, lowercased) header set is a superset of that
//! schema's required set; extra columns are tolerated.
//!
//! When a header set is broad enough to satisfy several schemas, the schema
//! declared first wins. That order is the dataset order in configuration, so
//! reordering datasets changes routing for such files. Ambiguous matches are
//! logged at `warn`.

use super::error::ClassificationError;
use crate::datasets::DatasetRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Normalize a header name for comparison.
pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Required-column fingerprint of one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    dataset: String,
    table: String,
    columns: Vec<String>,
    required: BTreeSet<String>,
}

impl TableSchema {
    pub fn new<I, S>(dataset: impl Into<String>, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let required = columns.iter().map(|c| normalize_header(c)).collect();
        Self {
            dataset: dataset.into(),
            table: table.into(),
            columns,
            required,
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Required columns as configured (original spelling).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// True when every required column is present in `headers`.
    pub fn is_covered_by(&self, headers: &BTreeSet<String>) -> bool {
        self.required.is_subset(headers)
    }
}

/// Ordered, immutable set of table schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    schemas: Vec<TableSchema>,
}

impl SchemaDefinition {
    pub fn new(schemas: Vec<TableSchema>) -> Self {
        Self { schemas }
    }

    pub fn from_registry(registry: &DatasetRegistry) -> Self {
        Self::new(
            registry
                .datasets()
                .iter()
                .map(|d| TableSchema::new(&d.name, &d.table, &d.required_columns))
                .collect(),
        )
    }

    pub fn schemas(&self) -> &[TableSchema] {
        &self.schemas
    }

    /// `(destination table, required columns)` in declaration order.
    pub fn allowed_schemas(&self) -> Vec<(String, Vec<String>)> {
        self.schemas
            .iter()
            .map(|s| (s.table.clone(), s.columns.clone()))
            .collect()
    }
}

/// Result of classifying one header set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    Matched(&'a TableSchema),
    NoMatch { detected_headers: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct TableClassifier {
    definition: Arc<SchemaDefinition>,
}

impl TableClassifier {
    pub fn new(definition: SchemaDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
        }
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    /// Pick the first declared schema covered by `headers`.
    ///
    /// An empty header set never matches.
    pub fn classify<I, S>(&self, headers: I) -> Classification<'_>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let detected: Vec<String> = headers
            .into_iter()
            .map(|h| h.as_ref().to_string())
            .collect();
        let normalized: BTreeSet<String> = detected.iter().map(|h| normalize_header(h)).collect();

        if normalized.is_empty() {
            return Classification::NoMatch {
                detected_headers: detected,
            };
        }

        let mut matches = self
            .definition
            .schemas
            .iter()
            .filter(|s| s.is_covered_by(&normalized));

        match matches.next() {
            Some(schema) => {
                let others: Vec<&str> = matches.map(|s| s.table()).collect();
                if !others.is_empty() {
                    warn!(
                        chosen = schema.table(),
                        also_matched = ?others,
                        "Upload headers satisfy several schemas; using the first declared"
                    );
                }
                Classification::Matched(schema)
            }
            None => Classification::NoMatch {
                detected_headers: detected,
            },
        }
    }

    /// Every schema covered by `headers`, in declaration order.
    pub fn all_matches<I, S>(&self, headers: I) -> Vec<&TableSchema>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized: BTreeSet<String> = headers
            .into_iter()
            .map(|h| normalize_header(h.as_ref()))
            .collect();
        if normalized.is_empty() {
            return Vec::new();
        }
        self.definition
            .schemas
            .iter()
            .filter(|s| s.is_covered_by(&normalized))
            .collect()
    }

    /// Classify, turning "no match" into a diagnostic error.
    pub fn route<I, S>(&self, headers: I) -> Result<&TableSchema, ClassificationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.classify(headers) {
            Classification::Matched(schema) => Ok(schema),
            Classification::NoMatch { detected_headers } => Err(ClassificationError {
                detected_headers,
                allowed_schemas: self.definition.allowed_schemas(),
            }),
        }
    }
}
