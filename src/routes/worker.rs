use rocket::State;
use rocket::serde::json::Json;

use crate::guards::{AuthGuard, WorkerGuard};
use crate::models::{
    UpdateLocationDto, UpdateWorkerProfileDto, WorkerDashboard, WorkerResponse, WorkerSummary,
};
use crate::services::cascade::DeletionSummary;
use crate::services::{AccountService, CascadeService, RequestService};
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse, parse_object_id};

#[get("/worker/profile")]
pub async fn get_profile(worker: WorkerGuard) -> Json<ApiResponse<WorkerResponse>> {
    Json(ApiResponse::success(worker.0.into()))
}

/// Public projection of any worker, visible to every signed-in account.
#[get("/worker/profile/<id>")]
pub async fn get_public_profile(
    state: &State<AppState>,
    _auth: AuthGuard,
    id: &str,
) -> Result<Json<ApiResponse<WorkerSummary>>, ApiError> {
    let id = parse_object_id(id, "worker")?;
    let worker = AccountService::worker_public_profile(state, id).await?;
    Ok(Json(ApiResponse::success(worker.into())))
}

#[patch("/worker/profile", data = "<dto>")]
pub async fn update_profile(
    state: &State<AppState>,
    worker: WorkerGuard,
    dto: Json<UpdateWorkerProfileDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    let updated =
        AccountService::update_worker_profile(state, &worker.0, dto.into_inner()).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Profile updated",
        updated.into(),
    )))
}

#[put("/worker/location", data = "<dto>")]
pub async fn update_location(
    state: &State<AppState>,
    worker: WorkerGuard,
    dto: Json<UpdateLocationDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    let updated =
        AccountService::update_worker_location(state, &worker.0, dto.into_inner()).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Location updated",
        updated.into(),
    )))
}

#[get("/worker/dashboard")]
pub async fn dashboard(
    state: &State<AppState>,
    worker: WorkerGuard,
) -> Result<Json<ApiResponse<WorkerDashboard>>, ApiError> {
    let dashboard = RequestService::worker_dashboard(state, &worker.0).await?;
    Ok(Json(ApiResponse::success(dashboard)))
}

#[delete("/worker/delete")]
pub async fn delete_account(
    state: &State<AppState>,
    worker: WorkerGuard,
) -> Result<Json<ApiResponse<DeletionSummary>>, ApiError> {
    let summary = CascadeService::delete_worker(state, &worker.0).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Account deleted",
        summary,
    )))
}
