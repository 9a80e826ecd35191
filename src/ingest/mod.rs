//! Upload ingestion: decode the CSV, route it by its headers, back it up and
//! bulk insert it into the matching raw table.

pub mod classifier;
pub mod coordinator;
pub mod decoder;
pub mod error;

pub use classifier::{
    normalize_header, Classification, SchemaDefinition, TableClassifier, TableSchema,
};
pub use coordinator::{IngestionCoordinator, IngestionReport};
pub use decoder::{decode_csv, DecodeOptions, DecodedCsv, Record};
pub use error::{BackupWarning, ClassificationError, DecodeError, IngestError, InsertError};
