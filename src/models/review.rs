use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub author: ObjectId,
    pub worker: ObjectId,
    pub request: ObjectId,
    pub rating: i32, // 1-5
    pub text: Option<String>,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    pub text: Option<String>,
}

/// Average and count over every review of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RatingStats {
    pub average: f64,
    pub count: i32,
}

impl RatingStats {
    pub fn from_ratings(ratings: impl IntoIterator<Item = i32>) -> Self {
        let (sum, count) = ratings
            .into_iter()
            .fold((0i64, 0i32), |(sum, count), r| (sum + r as i64, count + 1));

        if count == 0 {
            return RatingStats::default();
        }
        RatingStats {
            average: sum as f64 / count as f64,
            count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewAuthor {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: String,
    pub author: ReviewAuthor,
    pub worker: String,
    pub request: String,
    pub rating: i32,
    pub text: Option<String>,
    pub created_at: ChronoDateTime<Utc>,
}

impl ReviewResponse {
    pub fn new(review: Review, author_name: Option<String>) -> Self {
        ReviewResponse {
            id: review.id.to_hex(),
            author: ReviewAuthor {
                id: review.author.to_hex(),
                name: author_name,
            },
            worker: review.worker.to_hex(),
            request: review.request.to_hex(),
            rating: review.rating,
            text: review.text,
            created_at: review.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewPage {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub reviews: Vec<ReviewResponse>,
}
