//! Entity store.
//!
//! `Store` is the single persistence seam. Every mutating method is one atomic operation
//! conditioned on the expected prior state and reports "not applied" (`None` / `false`)
//! instead of mutating when that condition does not hold. Multi-document cascades are
//! composed from these calls by `services::cascade`.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{
    GeoLocation, Page, ProfileChanges, RatingStats, Review, SearchPage, ServiceRequest, Skill,
    User, Worker, WorkerQuery,
};
use crate::utils::ApiError;

pub const USERS: &str = "users";
pub const WORKERS: &str = "workers";
pub const REQUESTS: &str = "requests";
pub const REVIEWS: &str = "reviews";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key in {0}")]
    Duplicate(&'static str),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("failed to encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),

    #[error("failed to decode document: {0}")]
    Decode(#[from] mongodb::bson::de::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(collection) => {
                ApiError::conflict(format!("Duplicate entry in {collection}"))
            }
            other => ApiError::internal_error(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which requests a listing covers.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestScope {
    Requester(ObjectId),
    Assignee(ObjectId),
    /// Pending requests within `radius_meters` of `center`.
    PendingNear {
        center: GeoLocation,
        radius_meters: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewScope {
    Author(ObjectId),
    Worker(ObjectId),
    Request(ObjectId),
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- users ----
    /// Fails with `StoreError::Duplicate` when the email is taken.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>>;
    async fn update_user(&self, id: ObjectId, changes: &ProfileChanges) -> StoreResult<Option<User>>;
    async fn delete_user(&self, id: ObjectId) -> StoreResult<bool>;

    // ---- workers ----
    async fn insert_worker(&self, worker: &Worker) -> StoreResult<()>;
    async fn find_worker(&self, id: ObjectId) -> StoreResult<Option<Worker>>;
    async fn find_worker_by_email(&self, email: &str) -> StoreResult<Option<Worker>>;
    async fn find_workers(&self, ids: &[ObjectId]) -> StoreResult<Vec<Worker>>;
    async fn update_worker(
        &self,
        id: ObjectId,
        changes: &ProfileChanges,
    ) -> StoreResult<Option<Worker>>;
    /// Updates the rate of the skill with the same name (ignoring case) or appends it.
    async fn upsert_skill(&self, id: ObjectId, skill: &Skill) -> StoreResult<Option<Worker>>;
    /// `None` when the worker does not exist or has no skill with that name.
    async fn remove_skill(&self, id: ObjectId, name: &str) -> StoreResult<Option<Worker>>;
    async fn set_availability(&self, id: ObjectId, available: bool) -> StoreResult<Option<Worker>>;
    async fn set_rating(&self, id: ObjectId, stats: RatingStats) -> StoreResult<bool>;
    async fn increment_solved(&self, id: ObjectId) -> StoreResult<bool>;
    async fn delete_worker(&self, id: ObjectId) -> StoreResult<bool>;
    async fn search_workers(&self, query: &WorkerQuery) -> StoreResult<SearchPage>;

    // ---- requests ----
    async fn insert_request(&self, request: &ServiceRequest) -> StoreResult<()>;
    async fn find_request(&self, id: ObjectId) -> StoreResult<Option<ServiceRequest>>;
    /// Newest first.
    async fn list_requests(&self, scope: &RequestScope) -> StoreResult<Vec<ServiceRequest>>;
    /// Compare-and-swap on `status == pending`.
    async fn accept_request(
        &self,
        id: ObjectId,
        worker: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>>;
    /// Applies only while the request is accepted by `worker`.
    async fn resolve_request(
        &self,
        id: ObjectId,
        worker: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>>;
    /// Applies only when `requester` created the request.
    async fn delete_request(
        &self,
        id: ObjectId,
        requester: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>>;
    async fn delete_requests_by_requester(&self, requester: ObjectId) -> StoreResult<u64>;
    /// Detaches every request assigned to `worker`, leaving `marker` as the worker name.
    async fn tombstone_requests(&self, worker: ObjectId, marker: &str) -> StoreResult<u64>;

    // ---- reviews ----
    /// Fails with `StoreError::Duplicate` when the author already reviewed the request.
    async fn insert_review(&self, review: &Review) -> StoreResult<()>;
    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>>;
    async fn list_reviews(&self, scope: ReviewScope) -> StoreResult<Vec<Review>>;
    /// Newest first, with the total count for the worker.
    async fn worker_reviews(&self, worker: ObjectId, page: Page) -> StoreResult<(Vec<Review>, u64)>;
    /// Applies only when `author` wrote the review.
    async fn delete_review(&self, id: ObjectId, author: ObjectId) -> StoreResult<Option<Review>>;
    async fn delete_reviews(&self, scope: ReviewScope) -> StoreResult<u64>;
    async fn rating_stats(&self, worker: ObjectId) -> StoreResult<RatingStats>;
}

pub type DbConn = Arc<dyn Store>;
