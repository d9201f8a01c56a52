use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use serde_json::Value;

use crate::guards::UserGuard;
use crate::models::{CreateReviewDto, Page, ReviewPage, ReviewResponse};
use crate::services::ReviewService;
use crate::state::AppState;
use crate::utils::{ApiError, ApiResponse, parse_object_id};

#[post("/reviews/<request_id>", data = "<dto>")]
pub async fn create_review(
    state: &State<AppState>,
    user: UserGuard,
    request_id: &str,
    dto: Json<CreateReviewDto>,
) -> Result<status::Custom<Json<ApiResponse<ReviewResponse>>>, ApiError> {
    let request_id = parse_object_id(request_id, "request")?;
    let review = ReviewService::create(state, &user.0, request_id, dto.into_inner()).await?;
    let author = Some(user.0.name);
    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::success_with_message(
            "Review submitted",
            ReviewResponse::new(review, author),
        )),
    ))
}

/// Public listing, newest first.
#[get("/reviews/worker/<worker_id>?<page>&<limit>")]
pub async fn get_worker_reviews(
    state: &State<AppState>,
    worker_id: &str,
    page: Option<u64>,
    limit: Option<u64>,
) -> Result<Json<ApiResponse<ReviewPage>>, ApiError> {
    let worker_id = parse_object_id(worker_id, "worker")?;
    let page = Page::new(
        page,
        limit,
        state.config.default_page_limit,
        state.config.max_page_limit,
    );
    let reviews = ReviewService::list_for_worker(state, worker_id, page).await?;
    Ok(Json(ApiResponse::success(reviews)))
}

#[delete("/reviews/<id>")]
pub async fn delete_review(
    state: &State<AppState>,
    user: UserGuard,
    id: &str,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let id = parse_object_id(id, "review")?;
    ReviewService::delete(state, &user.0, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Review deleted",
        Value::Null,
    )))
}
