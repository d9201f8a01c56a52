use rocket::State;
use rocket::serde::json::Json;

use crate::guards::UserGuard;
use crate::models::{UpdateUserProfileDto, UserDashboard, UserResponse};
use crate::services::{AccountService, CascadeService, RequestService};
use crate::services::cascade::DeletionSummary;
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse};

#[get("/user/profile")]
pub async fn get_profile(user: UserGuard) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::success(user.0.into()))
}

#[patch("/user/profile", data = "<dto>")]
pub async fn update_profile(
    state: &State<AppState>,
    user: UserGuard,
    dto: Json<UpdateUserProfileDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let updated = AccountService::update_user_profile(state, &user.0, dto.into_inner()).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Profile updated",
        updated.into(),
    )))
}

#[get("/user/dashboard")]
pub async fn dashboard(
    state: &State<AppState>,
    user: UserGuard,
) -> Result<Json<ApiResponse<UserDashboard>>, ApiError> {
    let dashboard = RequestService::user_dashboard(state, &user.0).await?;
    Ok(Json(ApiResponse::success(dashboard)))
}

#[delete("/user/delete")]
pub async fn delete_account(
    state: &State<AppState>,
    user: UserGuard,
) -> Result<Json<ApiResponse<DeletionSummary>>, ApiError> {
    let summary = CascadeService::delete_user(state, &user.0).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Account deleted",
        summary,
    )))
}
