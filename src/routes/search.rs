use rocket::State;
use rocket::serde::json::Json;

use crate::guards::UserGuard;
use crate::models::{SearchResponse, SearchWorkersDto};
use crate::services::SearchService;
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse};

#[post("/search/workers", data = "<dto>")]
pub async fn search_workers(
    state: &State<AppState>,
    _user: UserGuard,
    dto: Json<SearchWorkersDto>,
) -> Result<Json<ApiResponse<SearchResponse>>, ApiError> {
    let results = SearchService::search(state, dto.into_inner()).await?;
    Ok(Json(ApiResponse::success(results)))
}
