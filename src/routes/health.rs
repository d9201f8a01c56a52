use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::utils::ApiResponse;

#[get("/health")]
pub fn health() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
