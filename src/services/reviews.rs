use log::info;
use mongodb::bson::{DateTime, oid::ObjectId};
use std::collections::{HashMap, HashSet};
use validator::Validate;

use crate::db::StoreError;
use crate::models::{
    CreateReviewDto, Page, RatingStats, RequestStatus, Review, ReviewPage, ReviewResponse, User,
};
use crate::state::AppState;
use crate::utils::ApiError;

pub struct ReviewService;

/// Re-derives a worker's rating from the reviews that currently exist.
pub async fn recompute_rating(state: &AppState, worker_id: ObjectId) -> Result<RatingStats, ApiError> {
    let stats = state.store.rating_stats(worker_id).await?;
    state.store.set_rating(worker_id, stats).await?;
    Ok(stats)
}

impl ReviewService {
    pub async fn create(
        state: &AppState,
        author: &User,
        request_id: ObjectId,
        dto: CreateReviewDto,
    ) -> Result<Review, ApiError> {
        dto.validate()?;

        let request = state
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Request not found"))?;
        if request.requester != author.id {
            return Err(ApiError::forbidden("You can only review your own requests"));
        }
        if request.status != RequestStatus::Resolved {
            return Err(ApiError::conflict("Only resolved requests can be reviewed"));
        }
        let worker_id = request
            .worker
            .ok_or_else(|| ApiError::conflict("The assigned worker no longer exists"))?;

        let review = Review {
            id: ObjectId::new(),
            author: author.id,
            worker: worker_id,
            request: request.id,
            rating: dto.rating,
            text: dto
                .text
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            created_at: DateTime::now(),
        };

        match state.store.insert_review(&review).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(ApiError::conflict("You have already reviewed this request"));
            }
            Err(e) => return Err(e.into()),
        }

        let stats = recompute_rating(state, worker_id).await?;
        info!(
            "Review {} on worker {} (now {:.2} over {})",
            review.id, worker_id, stats.average, stats.count
        );
        Ok(review)
    }

    pub async fn list_for_worker(
        state: &AppState,
        worker_id: ObjectId,
        page: Page,
    ) -> Result<ReviewPage, ApiError> {
        if state.store.find_worker(worker_id).await?.is_none() {
            return Err(ApiError::not_found("Worker not found"));
        }

        let (reviews, total) = state.store.worker_reviews(worker_id, page).await?;

        let author_ids: Vec<ObjectId> = reviews
            .iter()
            .map(|r| r.author)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let names: HashMap<ObjectId, String> = state
            .store
            .find_users(&author_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect();

        Ok(ReviewPage {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: page.total_pages(total),
            reviews: reviews
                .into_iter()
                .map(|review| {
                    let name = names.get(&review.author).cloned();
                    ReviewResponse::new(review, name)
                })
                .collect(),
        })
    }

    pub async fn delete(state: &AppState, author: &User, review_id: ObjectId) -> Result<(), ApiError> {
        let Some(review) = state.store.delete_review(review_id, author.id).await? else {
            return match state.store.find_review(review_id).await? {
                Some(_) => Err(ApiError::forbidden("You can only delete your own reviews")),
                None => Err(ApiError::not_found("Review not found")),
            };
        };

        recompute_rating(state, review.worker).await?;
        info!("Review {} deleted by {}", review.id, author.id);
        Ok(())
    }
}
