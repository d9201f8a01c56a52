use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;

use crate::models::{AuthResponse, LoginDto, SignupDto};
use crate::services::AccountService;
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse};

#[post("/auth/signup", data = "<dto>")]
pub async fn signup(
    state: &State<AppState>,
    dto: Json<SignupDto>,
) -> Result<status::Custom<Json<ApiResponse<AuthResponse>>>, ApiError> {
    let auth = AccountService::signup(state, dto.into_inner()).await?;
    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::success_with_message("Account created", auth)),
    ))
}

#[post("/auth/login", data = "<dto>")]
pub async fn login(
    state: &State<AppState>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let auth = AccountService::login(state, dto.into_inner()).await?;
    Ok(Json(ApiResponse::success_with_message("Login successful", auth)))
}
