use crate::config::ServerConfig;
use crate::http::controllers::{
    clean_handler, denormalize_handler, errors_handler, health_handler, index_handler,
    load_handler, logs_handler, pipeline_handler, stats_handler, upload_handler,
};
use crate::EtlEngine;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct AppServer {
    pub router: Router,
    pub engine: Arc<EtlEngine>,
}

pub const PATH_INDEX: &str = "/";
pub const PATH_HEALTH: &str = "/health";
pub const PATH_UPLOAD: &str = "/upload";
pub const PATH_PROCESS: &str = "/process";
pub const PATH_PROCESS_SLASH: &str = "/process/";
pub const PATH_PROCESS_CLEAN: &str = "/process/clean";
pub const PATH_PROCESS_LOAD: &str = "/process/load";
pub const PATH_PROCESS_DENORMALIZE: &str = "/process/denormalize";
pub const PATH_AUDIT_LOGS: &str = "/audit/logs";
pub const PATH_AUDIT_ERRORS: &str = "/audit/errors";
pub const PATH_AUDIT_STATS: &str = "/audit/stats";

impl AppServer {
    /// Build the router. Everything except `/` and `/health` lives under
    /// `config.api_prefix`.
    pub fn new(engine: EtlEngine, config: &ServerConfig) -> Result<Self> {
        let engine = Arc::new(engine);
        let api_prefix: Arc<str> = Arc::from(config.api_prefix.as_str());

        let api = Router::new()
            .route(
                PATH_UPLOAD,
                post(upload_handler).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
            )
            .route(PATH_PROCESS, post(pipeline_handler))
            .route(PATH_PROCESS_SLASH, post(pipeline_handler))
            .route(PATH_PROCESS_CLEAN, post(clean_handler))
            .route(PATH_PROCESS_LOAD, post(load_handler))
            .route(PATH_PROCESS_DENORMALIZE, post(denormalize_handler))
            .route(PATH_AUDIT_LOGS, get(logs_handler))
            .route(PATH_AUDIT_ERRORS, get(errors_handler))
            .route(PATH_AUDIT_STATS, get(stats_handler));

        let router = Router::new()
            .route(
                PATH_INDEX,
                get(move || index_handler(Arc::clone(&api_prefix))),
            )
            .route(PATH_HEALTH, get(health_handler))
            .nest(&config.api_prefix, api)
            .layer(cors_layer(&config.cors_origins)?)
            .with_state(engine.clone());

        Ok(AppServer { router, engine })
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    if origins.iter().any(|o| o.trim() == "*") {
        anyhow::bail!("Wildcard CORS origin '*' is not allowed with credentials");
    }

    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{}'", o))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]))
}
