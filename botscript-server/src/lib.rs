//! Botscript server
//!
//! HTTP front end for the botscript sandbox. The same binary doubles as the
//! worker process the sandbox spawns for each execution.

pub mod config;
pub mod error;
pub mod routes;

use actix_web::web;
use botscript_sandbox::SandboxService;
use error::ServerError;
use std::sync::Arc;

pub use config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SandboxService>,
}

impl AppState {
    pub fn new(service: SandboxService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Register routes and body extractors.
///
/// Malformed bodies are answered with a 400 in the regular response shape.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ServerError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::FormConfig::default()
            .error_handler(|err, _req| ServerError::BadRequest(err.to_string()).into()),
    )
    .service(routes::health::index)
    .service(routes::health::health_check)
    .service(routes::script::run_script);
}
