//! Script execution endpoint
//!
//! POST /
//! Accepts `{"script": "..."}` as JSON or as a URL-encoded form and always
//! answers with `{"result": "...", "error": "..."}`.

use crate::AppState;
use actix_web::{post, web, Either, HttpResponse};
use botscript_sandbox::ScriptRequest;

#[post("/")]
pub async fn run_script(
    state: web::Data<AppState>,
    body: Either<web::Json<ScriptRequest>, web::Form<ScriptRequest>>,
) -> HttpResponse {
    let request = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };

    let response = state.service.handle(request).await;
    HttpResponse::Ok().json(response)
}
