use rocket::State;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::guards::WorkerGuard;
use crate::models::{AvailabilityDto, SkillsResponse, UpsertSkillDto};
use crate::services::SkillService;
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse};

#[get("/worker/skills")]
pub async fn list_skills(
    state: &State<AppState>,
    worker: WorkerGuard,
) -> Result<Json<ApiResponse<SkillsResponse>>, ApiError> {
    let skills = SkillService::list(state, worker.0.id).await?;
    Ok(Json(ApiResponse::success(skills)))
}

#[post("/worker/skills", data = "<dto>")]
pub async fn upsert_skill(
    state: &State<AppState>,
    worker: WorkerGuard,
    dto: Json<UpsertSkillDto>,
) -> Result<Json<ApiResponse<SkillsResponse>>, ApiError> {
    let skills = SkillService::upsert(state, worker.0.id, dto.into_inner()).await?;
    Ok(Json(ApiResponse::success_with_message("Skill saved", skills)))
}

#[delete("/worker/skills/<name>")]
pub async fn remove_skill(
    state: &State<AppState>,
    worker: WorkerGuard,
    name: &str,
) -> Result<Json<ApiResponse<SkillsResponse>>, ApiError> {
    let skills = SkillService::remove(state, worker.0.id, name).await?;
    Ok(Json(ApiResponse::success_with_message("Skill removed", skills)))
}

#[patch("/worker/availability", data = "<dto>")]
pub async fn set_availability(
    state: &State<AppState>,
    worker: WorkerGuard,
    dto: Json<AvailabilityDto>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let availability =
        SkillService::set_availability(state, worker.0.id, dto.into_inner()).await?;
    Ok(Json(ApiResponse::success(json!({ "availability": availability }))))
}
