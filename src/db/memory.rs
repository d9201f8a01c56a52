//! In-process `Store` backed by insertion-ordered maps.
//!
//! Used by the test suite and for running the API without a database. All tables sit
//! behind one `RwLock`, so every method is atomic with respect to the others.

use async_trait::async_trait;
use indexmap::IndexMap;
use mongodb::bson::{DateTime, oid::ObjectId};
use std::cmp::Ordering;
use tokio::sync::RwLock;

use super::{REVIEWS, RequestScope, ReviewScope, Store, StoreError, StoreResult, USERS, WORKERS};
use crate::models::{
    Page, ProfileChanges, RatingStats, RequestStatus, Review, SearchPage, ServiceRequest, Skill,
    SortOrder, User, Worker, WorkerHit, WorkerQuery,
};

#[derive(Default)]
struct Tables {
    users: IndexMap<ObjectId, User>,
    workers: IndexMap<ObjectId, Worker>,
    requests: IndexMap<ObjectId, ServiceRequest>,
    reviews: IndexMap<ObjectId, Review>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_user_changes(user: &mut User, changes: &ProfileChanges) {
    if let Some(name) = &changes.name {
        user.name = name.clone();
    }
    if let Some(phone) = &changes.phone {
        user.phone = Some(phone.clone());
    }
    if let Some(photo) = &changes.profile_photo {
        user.profile_photo = Some(photo.clone());
    }
    if let Some(location) = &changes.location {
        user.location = location.clone();
    }
    user.updated_at = DateTime::now();
}

fn apply_worker_changes(worker: &mut Worker, changes: &ProfileChanges) {
    if let Some(name) = &changes.name {
        worker.name = name.clone();
    }
    if let Some(phone) = &changes.phone {
        worker.phone = Some(phone.clone());
    }
    if let Some(photo) = &changes.profile_photo {
        worker.profile_photo = Some(photo.clone());
    }
    if let Some(worker_type) = &changes.worker_type {
        worker.worker_type = worker_type.clone();
    }
    if let Some(years) = changes.experience_years {
        worker.experience_years = years;
    }
    if let Some(location) = &changes.location {
        worker.location = location.clone();
    }
    worker.updated_at = DateTime::now();
}

fn cmp_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Mirrors the MongoDB sort documents: the primary key, then `_id` ascending.
/// Array fields sort by their smallest element ascending and largest descending.
fn compare_workers(sort: SortOrder, a: &Worker, b: &Worker) -> Ordering {
    let primary = match sort {
        SortOrder::RatingAsc => cmp_f64(Some(a.rating_avg), Some(b.rating_avg)),
        SortOrder::RatingDesc => cmp_f64(Some(b.rating_avg), Some(a.rating_avg)),
        SortOrder::FeesAsc => cmp_f64(a.lowest_rate(), b.lowest_rate()),
        SortOrder::FeesDesc => cmp_f64(b.highest_rate(), a.highest_rate()),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn newest_first<'a>(
    requests: impl DoubleEndedIterator<Item = &'a ServiceRequest>,
) -> Vec<ServiceRequest> {
    let mut list: Vec<ServiceRequest> = requests.rev().cloned().collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    list
}

fn in_scope(review: &Review, scope: ReviewScope) -> bool {
    match scope {
        ReviewScope::Author(id) => review.author == id,
        ReviewScope::Worker(id) => review.worker == id,
        ReviewScope::Request(id) => review.request == id,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(USERS));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
    }

    async fn update_user(&self, id: ObjectId, changes: &ProfileChanges) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            apply_user_changes(user, changes);
            user.clone()
        }))
    }

    async fn delete_user(&self, id: ObjectId) -> StoreResult<bool> {
        Ok(self.tables.write().await.users.shift_remove(&id).is_some())
    }

    async fn insert_worker(&self, worker: &Worker) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.workers.values().any(|w| w.email == worker.email) {
            return Err(StoreError::Duplicate(WORKERS));
        }
        tables.workers.insert(worker.id, worker.clone());
        Ok(())
    }

    async fn find_worker(&self, id: ObjectId) -> StoreResult<Option<Worker>> {
        Ok(self.tables.read().await.workers.get(&id).cloned())
    }

    async fn find_worker_by_email(&self, email: &str) -> StoreResult<Option<Worker>> {
        let tables = self.tables.read().await;
        Ok(tables.workers.values().find(|w| w.email == email).cloned())
    }

    async fn find_workers(&self, ids: &[ObjectId]) -> StoreResult<Vec<Worker>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.workers.get(id).cloned()).collect())
    }

    async fn update_worker(
        &self,
        id: ObjectId,
        changes: &ProfileChanges,
    ) -> StoreResult<Option<Worker>> {
        let mut tables = self.tables.write().await;
        Ok(tables.workers.get_mut(&id).map(|worker| {
            apply_worker_changes(worker, changes);
            worker.clone()
        }))
    }

    async fn upsert_skill(&self, id: ObjectId, skill: &Skill) -> StoreResult<Option<Worker>> {
        let mut tables = self.tables.write().await;
        Ok(tables.workers.get_mut(&id).map(|worker| {
            worker.upsert_skill(skill.clone());
            worker.updated_at = DateTime::now();
            worker.clone()
        }))
    }

    async fn remove_skill(&self, id: ObjectId, name: &str) -> StoreResult<Option<Worker>> {
        let mut tables = self.tables.write().await;
        let Some(worker) = tables.workers.get_mut(&id) else {
            return Ok(None);
        };
        if !worker.remove_skill(name) {
            return Ok(None);
        }
        worker.updated_at = DateTime::now();
        Ok(Some(worker.clone()))
    }

    async fn set_availability(&self, id: ObjectId, available: bool) -> StoreResult<Option<Worker>> {
        let mut tables = self.tables.write().await;
        Ok(tables.workers.get_mut(&id).map(|worker| {
            worker.availability = available;
            worker.updated_at = DateTime::now();
            worker.clone()
        }))
    }

    async fn set_rating(&self, id: ObjectId, stats: RatingStats) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.workers.get_mut(&id) {
            Some(worker) => {
                worker.rating_avg = stats.average;
                worker.reviews_count = stats.count;
                true
            }
            None => false,
        })
    }

    async fn increment_solved(&self, id: ObjectId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.workers.get_mut(&id) {
            Some(worker) => {
                worker.solved_count += 1;
                true
            }
            None => false,
        })
    }

    async fn delete_worker(&self, id: ObjectId) -> StoreResult<bool> {
        Ok(self.tables.write().await.workers.shift_remove(&id).is_some())
    }

    async fn search_workers(&self, query: &WorkerQuery) -> StoreResult<SearchPage> {
        let tables = self.tables.read().await;
        let mut hits: Vec<WorkerHit> = tables
            .workers
            .values()
            .filter(|worker| query.matches(worker))
            .filter_map(|worker| match &query.near {
                Some(near) => {
                    let distance = near.center.distance_to(&worker.location);
                    (distance <= near.radius_meters).then(|| WorkerHit {
                        worker: worker.clone(),
                        distance: Some(distance),
                    })
                }
                None => Some(WorkerHit {
                    worker: worker.clone(),
                    distance: None,
                }),
            })
            .collect();

        if query.near.is_some() {
            hits.sort_by(|a, b| cmp_f64(a.distance, b.distance));
        }
        if let Some(sort) = query.sort {
            hits.sort_by(|a, b| compare_workers(sort, &a.worker, &b.worker));
        }

        let total = hits.len() as u64;
        let hits = hits
            .into_iter()
            .skip(usize::try_from(query.page.skip()).unwrap_or(usize::MAX))
            .take(query.page.limit as usize)
            .collect();
        Ok(SearchPage { hits, total })
    }

    async fn insert_request(&self, request: &ServiceRequest) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_request(&self, id: ObjectId) -> StoreResult<Option<ServiceRequest>> {
        Ok(self.tables.read().await.requests.get(&id).cloned())
    }

    async fn list_requests(&self, scope: &RequestScope) -> StoreResult<Vec<ServiceRequest>> {
        let tables = self.tables.read().await;
        let requests = tables.requests.values();
        Ok(match scope {
            RequestScope::Requester(id) => newest_first(requests.filter(|r| r.requester == *id)),
            RequestScope::Assignee(id) => newest_first(requests.filter(|r| r.worker == Some(*id))),
            RequestScope::PendingNear {
                center,
                radius_meters,
            } => newest_first(requests.filter(|r| {
                r.status == RequestStatus::Pending
                    && center.distance_to(&r.location) <= *radius_meters
            })),
        })
    }

    async fn accept_request(
        &self,
        id: ObjectId,
        worker: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>> {
        let mut tables = self.tables.write().await;
        Ok(match tables.requests.get_mut(&id) {
            Some(request) if request.status == RequestStatus::Pending && request.worker.is_none() => {
                request.worker = Some(worker);
                request.status = RequestStatus::Accepted;
                request.updated_at = DateTime::now();
                Some(request.clone())
            }
            _ => None,
        })
    }

    async fn resolve_request(
        &self,
        id: ObjectId,
        worker: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>> {
        let mut tables = self.tables.write().await;
        Ok(match tables.requests.get_mut(&id) {
            Some(request)
                if request.status == RequestStatus::Accepted && request.worker == Some(worker) =>
            {
                request.status = RequestStatus::Resolved;
                request.updated_at = DateTime::now();
                Some(request.clone())
            }
            _ => None,
        })
    }

    async fn delete_request(
        &self,
        id: ObjectId,
        requester: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .requests
            .get(&id)
            .is_some_and(|r| r.requester == requester);
        Ok(if owned { tables.requests.shift_remove(&id) } else { None })
    }

    async fn delete_requests_by_requester(&self, requester: ObjectId) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.requests.len();
        tables.requests.retain(|_, r| r.requester != requester);
        Ok((before - tables.requests.len()) as u64)
    }

    async fn tombstone_requests(&self, worker: ObjectId, marker: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let now = DateTime::now();
        let mut count = 0;
        for request in tables.requests.values_mut().filter(|r| r.worker == Some(worker)) {
            request.worker = None;
            request.worker_name = Some(marker.to_string());
            request.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .reviews
            .values()
            .any(|r| r.author == review.author && r.request == review.request)
        {
            return Err(StoreError::Duplicate(REVIEWS));
        }
        tables.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self.tables.read().await.reviews.get(&id).cloned())
    }

    async fn list_reviews(&self, scope: ReviewScope) -> StoreResult<Vec<Review>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .values()
            .filter(|r| in_scope(r, scope))
            .cloned()
            .collect())
    }

    async fn worker_reviews(&self, worker: ObjectId, page: Page) -> StoreResult<(Vec<Review>, u64)> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .rev()
            .filter(|r| r.worker == worker)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = reviews.len() as u64;
        let reviews = reviews
            .into_iter()
            .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .collect();
        Ok((reviews, total))
    }

    async fn delete_review(&self, id: ObjectId, author: ObjectId) -> StoreResult<Option<Review>> {
        let mut tables = self.tables.write().await;
        let owned = tables.reviews.get(&id).is_some_and(|r| r.author == author);
        Ok(if owned { tables.reviews.shift_remove(&id) } else { None })
    }

    async fn delete_reviews(&self, scope: ReviewScope) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.reviews.len();
        tables.reviews.retain(|_, r| !in_scope(r, scope));
        Ok((before - tables.reviews.len()) as u64)
    }

    async fn rating_stats(&self, worker: ObjectId) -> StoreResult<RatingStats> {
        let tables = self.tables.read().await;
        Ok(RatingStats::from_ratings(
            tables
                .reviews
                .values()
                .filter(|r| r.worker == worker)
                .map(|r| r.rating),
        ))
    }
}
