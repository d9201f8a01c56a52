use rocket::State;
use rocket::response::status;
use rocket::serde::json::Json;

use crate::guards::{AuthGuard, UserGuard, WorkerGuard};
use crate::models::{CreateRequestDto, DashboardStats, RequestResponse};
use crate::services::cascade::DeletionSummary;
use crate::services::{CascadeService, RequestService};
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse, parse_object_id};

#[post("/requests", data = "<dto>")]
pub async fn create_request(
    state: &State<AppState>,
    user: UserGuard,
    dto: Json<CreateRequestDto>,
) -> Result<status::Created<Json<ApiResponse<RequestResponse>>>, ApiError> {
    let request = RequestService::create(state, &user.0, dto.into_inner()).await?;
    let location = format!("/api/v1/requests/{}", request.id.to_hex());
    Ok(status::Created::new(location).body(Json(ApiResponse::success_with_message(
        "Request created",
        request.into(),
    ))))
}

#[post("/requests/<id>/accept")]
pub async fn accept_request(
    state: &State<AppState>,
    worker: WorkerGuard,
    id: &str,
) -> Result<Json<ApiResponse<RequestResponse>>, ApiError> {
    let id = parse_object_id(id, "request")?;
    let request = RequestService::accept(state, &worker.0, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Request accepted",
        request.into(),
    )))
}

#[post("/requests/<id>/resolve")]
pub async fn resolve_request(
    state: &State<AppState>,
    worker: WorkerGuard,
    id: &str,
) -> Result<Json<ApiResponse<RequestResponse>>, ApiError> {
    let id = parse_object_id(id, "request")?;
    let request = RequestService::resolve(state, &worker.0, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Request resolved",
        request.into(),
    )))
}

#[get("/requests/dashboard")]
pub async fn request_stats(
    state: &State<AppState>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<DashboardStats>>, ApiError> {
    let stats = RequestService::stats(state, auth.account_id, auth.role).await?;
    Ok(Json(ApiResponse::success(stats)))
}

#[delete("/requests/<id>")]
pub async fn delete_request(
    state: &State<AppState>,
    user: UserGuard,
    id: &str,
) -> Result<Json<ApiResponse<DeletionSummary>>, ApiError> {
    let id = parse_object_id(id, "request")?;
    let summary = CascadeService::delete_request(state, &user.0, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Request deleted",
        summary,
    )))
}
