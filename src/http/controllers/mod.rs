pub mod audit_controller;
pub mod health_controller;
pub mod process_controller;
pub mod upload_controller;

pub use audit_controller::{errors_handler, logs_handler, stats_handler};
pub use health_controller::{health_handler, index_handler};
pub use process_controller::{clean_handler, denormalize_handler, load_handler, pipeline_handler};
pub use upload_controller::{upload_handler, FILE_FIELD};
