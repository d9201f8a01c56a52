//! Deletions that span collections.
//!
//! Each saga runs its store steps in order and stops at the first failure. The owning record
//! goes last among the store steps; blob cleanup follows the commit and never fails the call.

use log::info;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::db::{RequestScope, ReviewScope};
use crate::models::{DELETED_WORKER, User, Worker};
use crate::services::reviews::recompute_rating;
use crate::state::AppState;
use crate::utils::ApiError;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct DeletionSummary {
    pub requests: u64,
    pub reviews: u64,
}

pub struct CascadeService;

impl CascadeService {
    pub async fn delete_user(state: &AppState, user: &User) -> Result<DeletionSummary, ApiError> {
        let requests = state
            .store
            .list_requests(&RequestScope::Requester(user.id))
            .await?;
        let mut blobs: Vec<String> = requests.into_iter().flat_map(|r| r.photos).collect();

        let deleted_requests = state.store.delete_requests_by_requester(user.id).await?;

        let reviewed: BTreeSet<ObjectId> = state
            .store
            .list_reviews(ReviewScope::Author(user.id))
            .await?
            .into_iter()
            .map(|r| r.worker)
            .collect();
        let deleted_reviews = state.store.delete_reviews(ReviewScope::Author(user.id)).await?;
        for worker_id in reviewed {
            recompute_rating(state, worker_id).await?;
        }

        if !state.store.delete_user(user.id).await? {
            return Err(ApiError::not_found("User not found"));
        }
        info!(
            "User {} deleted with {} requests and {} reviews",
            user.id, deleted_requests, deleted_reviews
        );

        blobs.extend(user.profile_photo.clone());
        state.discard_blobs(&blobs).await;

        Ok(DeletionSummary {
            requests: deleted_requests,
            reviews: deleted_reviews,
        })
    }

    /// Requests the worker handled stay with their requesters, detached from the account.
    pub async fn delete_worker(
        state: &AppState,
        worker: &Worker,
    ) -> Result<DeletionSummary, ApiError> {
        let detached = state.store.tombstone_requests(worker.id, DELETED_WORKER).await?;
        let deleted_reviews = state.store.delete_reviews(ReviewScope::Worker(worker.id)).await?;

        if !state.store.delete_worker(worker.id).await? {
            return Err(ApiError::not_found("Worker not found"));
        }
        info!(
            "Worker {} deleted, {} requests detached, {} reviews removed",
            worker.id, detached, deleted_reviews
        );

        state.discard_blobs(worker.profile_photo.iter()).await;

        Ok(DeletionSummary {
            requests: detached,
            reviews: deleted_reviews,
        })
    }

    pub async fn delete_request(
        state: &AppState,
        requester: &User,
        request_id: ObjectId,
    ) -> Result<DeletionSummary, ApiError> {
        let Some(request) = state.store.delete_request(request_id, requester.id).await? else {
            return match state.store.find_request(request_id).await? {
                Some(_) => Err(ApiError::forbidden("You can only delete your own requests")),
                None => Err(ApiError::not_found("Request not found")),
            };
        };

        let deleted_reviews = state
            .store
            .delete_reviews(ReviewScope::Request(request.id))
            .await?;
        if let (Some(worker_id), true) = (request.worker, deleted_reviews > 0) {
            recompute_rating(state, worker_id).await?;
        }
        info!("Request {} deleted by {}", request.id, requester.id);

        state.discard_blobs(&request.photos).await;

        Ok(DeletionSummary {
            requests: 1,
            reviews: deleted_reviews,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateReviewDto, RequestStatus};
    use crate::services::requests::RequestService;
    use crate::services::reviews::ReviewService;
    use crate::test_support::{KHANNA, RecordingBlobStore, TestApp};
    use crate::utils::ErrorKind;
    use std::sync::Arc;

    async fn review(app: &TestApp, user: &User, worker: &Worker, rating: i32) -> ObjectId {
        let request = app.request(user, &["/uploads/tap.jpg"]).await;
        RequestService::accept(&app.state, worker, request.id).await.unwrap();
        RequestService::resolve(&app.state, worker, request.id).await.unwrap();
        ReviewService::create(
            &app.state,
            user,
            request.id,
            CreateReviewDto { rating, text: None },
        )
        .await
        .unwrap();
        request.id
    }

    #[tokio::test]
    async fn deleting_a_worker_tombstones_its_requests() {
        let app = TestApp::new();
        let asha = app.user("Asha", KHANNA).await;
        let mut ravi = app.worker("Ravi", "plumber", KHANNA).await;
        ravi.profile_photo = Some("/uploads/ravi.png".into());

        let reviewed = review(&app, &asha, &ravi, 5).await;
        let accepted = app.request(&asha, &[]).await;
        RequestService::accept(&app.state, &ravi, accepted.id).await.unwrap();

        let summary = CascadeService::delete_worker(&app.state, &ravi).await.unwrap();
        assert_eq!(summary, DeletionSummary { requests: 2, reviews: 1 });

        let request = app.state.store.find_request(reviewed).await.unwrap().unwrap();
        assert_eq!(request.worker, None);
        assert_eq!(request.worker_name.as_deref(), Some(DELETED_WORKER));
        assert_eq!(request.status, RequestStatus::Resolved);
        let request = app.state.store.find_request(accepted.id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Accepted);
        assert!(request.assignment_consistent());

        assert!(app.state.store.find_worker(ravi.id).await.unwrap().is_none());
        assert_eq!(app.blobs.deleted(), vec!["/uploads/ravi.png".to_string()]);

        let dashboard = RequestService::user_dashboard(&app.state, &asha).await.unwrap();
        let assignee = dashboard.requests[0].assignee.as_ref().unwrap();
        assert_eq!(assignee.name, DELETED_WORKER);
        assert_eq!(assignee.id, None);
    }

    #[tokio::test]
    async fn deleting_a_user_removes_only_their_data() {
        let app = TestApp::new();
        let asha = app.user("Asha", KHANNA).await;
        let bela = app.user("Bela", KHANNA).await;
        let ravi = app.worker("Ravi", "plumber", KHANNA).await;

        review(&app, &asha, &ravi, 1).await;
        let kept = review(&app, &bela, &ravi, 5).await;
        let avg = app.state.store.find_worker(ravi.id).await.unwrap().unwrap().rating_avg;
        assert!((avg - 3.0).abs() < 1e-9);

        let summary = CascadeService::delete_user(&app.state, &asha).await.unwrap();
        assert_eq!(summary, DeletionSummary { requests: 1, reviews: 1 });

        let worker = app.state.store.find_worker(ravi.id).await.unwrap().unwrap();
        assert_eq!(worker.reviews_count, 1);
        assert!((worker.rating_avg - 5.0).abs() < 1e-9);
        assert!(app.state.store.find_request(kept).await.unwrap().is_some());
        assert!(app.state.store.find_user(asha.id).await.unwrap().is_none());
        assert!(app.state.store.find_user(bela.id).await.unwrap().is_some());
        assert_eq!(app.blobs.deleted(), vec!["/uploads/tap.jpg".to_string()]);
    }

    #[tokio::test]
    async fn deleting_a_request_resets_rating() {
        let app = TestApp::new();
        let asha = app.user("Asha", KHANNA).await;
        let mallory = app.user("Mallory", KHANNA).await;
        let ravi = app.worker("Ravi", "plumber", KHANNA).await;
        let request = review(&app, &asha, &ravi, 4).await;

        let err = CascadeService::delete_request(&app.state, &mallory, request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);

        CascadeService::delete_request(&app.state, &asha, request).await.unwrap();
        let worker = app.state.store.find_worker(ravi.id).await.unwrap().unwrap();
        assert_eq!((worker.rating_avg, worker.reviews_count), (0.0, 0));

        let err = CascadeService::delete_request(&app.state, &asha, request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn blob_failures_do_not_fail_the_deletion() {
        let mut app = TestApp::new();
        let blobs = Arc::new(RecordingBlobStore::failing_transiently(100));
        app.state.blobs = blobs.clone();
        let asha = app.user("Asha", KHANNA).await;
        let request = app.request(&asha, &["/uploads/a.jpg"]).await;

        CascadeService::delete_request(&app.state, &asha, request.id).await.unwrap();
        assert!(app.state.store.find_request(request.id).await.unwrap().is_none());
        assert_eq!(blobs.delete_attempts(), app.state.blob_retry.attempts);
    }
}
