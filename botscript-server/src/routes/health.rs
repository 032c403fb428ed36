//! Liveness endpoints

use crate::AppState;
use actix_web::{get, web, HttpResponse, Responder};

/// Plain liveness probe kept for existing load balancer checks
#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("200 OK")
}

#[get("/health")]
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "worker": state.service.worker_name(),
        "hard_timeout_ms": state.service.hard_timeout().as_millis() as u64,
    }))
}
