pub mod audit;
pub mod config;
pub mod datasets;
mod engine;
pub mod http;
pub mod ingest;
pub mod procedures;
pub mod storage;
pub mod telemetry;
pub mod warehouse;

pub use engine::{EtlEngine, EtlEngineBuilder};
