use async_trait::async_trait;
use log::info;
use mongodb::bson::{self, Bson, DateTime, Document, doc, oid::ObjectId};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Cursor, Database, IndexModel};
use serde::de::DeserializeOwned;

use super::{
    REQUESTS, REVIEWS, RequestScope, ReviewScope, Store, StoreError, StoreResult, USERS, WORKERS,
};
use crate::models::{
    EARTH_RADIUS_METERS, Page, ProfileChanges, RatingStats, RequestStatus, Review, SearchPage,
    ServiceRequest, Skill, SortOrder, User, Worker, WorkerHit, WorkerQuery,
};
use crate::utils::exact_name_pattern;

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    users: Collection<User>,
    workers: Collection<Worker>,
    requests: Collection<ServiceRequest>,
    reviews: Collection<Review>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;

        // Test connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;

        let store = MongoStore::new(&client.database(database));
        store.ensure_indexes().await?;
        Ok(store)
    }

    pub fn new(db: &Database) -> Self {
        MongoStore {
            users: db.collection(USERS),
            workers: db.collection(WORKERS),
            requests: db.collection(REQUESTS),
            reviews: db.collection(REVIEWS),
        }
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.workers
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.workers
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "location": "2dsphere" })
                    .build(),
                None,
            )
            .await?;
        self.requests
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "location": "2dsphere" })
                    .build(),
                None,
            )
            .await?;
        self.reviews
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "author": 1, "request": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;

        info!("✓ MongoDB indexes ensured");
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn insert_error(err: mongodb::error::Error, collection: &'static str) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Duplicate(collection)
    } else {
        StoreError::Database(err)
    }
}

async fn collect<T>(mut cursor: Cursor<T>) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut items = Vec::new();
    while cursor.advance().await? {
        items.push(cursor.deserialize_current()?);
    }
    Ok(items)
}

fn return_updated() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn skill_name_match(name: &str) -> Document {
    doc! { "name": { "$regex": exact_name_pattern(name), "$options": "i" } }
}

/// `$set` body for a profile edit. Worker-only fields are ignored by the user collection
/// because they are never set for users.
fn changes_document(changes: &ProfileChanges) -> StoreResult<Document> {
    let mut set = doc! { "updated_at": DateTime::now() };
    if let Some(name) = &changes.name {
        set.insert("name", name);
    }
    if let Some(phone) = &changes.phone {
        set.insert("phone", phone);
    }
    if let Some(photo) = &changes.profile_photo {
        set.insert("profile_photo", photo);
    }
    if let Some(worker_type) = &changes.worker_type {
        set.insert("worker_type", worker_type);
    }
    if let Some(years) = changes.experience_years {
        set.insert("experience_years", years);
    }
    if let Some(location) = &changes.location {
        set.insert("location", bson::to_bson(location)?);
    }
    Ok(set)
}

/// Every non-geographic predicate of a search as one filter document.
pub(crate) fn worker_filter(query: &WorkerQuery) -> Document {
    let mut filter = doc! {
        "availability": true,
        "rating_avg": { "$gte": query.rating_min, "$lte": query.rating_max },
    };

    if let Some(worker_type) = &query.worker_type {
        filter.insert("worker_type", worker_type);
    }
    if !query.skills.is_empty() {
        filter.insert("skills.name", doc! { "$in": query.skills.clone() });
    }
    if let Some(fees) = query.fees {
        // Without $elemMatch each bound may be satisfied by a different skill.
        let mut range = doc! { "$gte": fees.min };
        if let Some(max) = fees.max {
            range.insert("$lte", max);
        }
        filter.insert("skills.hourly_rate", range);
    }

    let address = &query.address;
    if let Some(state) = &address.state {
        filter.insert("address.state", state);
    }
    if let Some(district) = &address.district {
        filter.insert("address.district", district);
    }
    if let Some(tehsil) = &address.tehsil {
        filter.insert("address.tehsil", tehsil);
    }

    filter
}

pub(crate) fn sort_document(sort: SortOrder) -> Document {
    match sort {
        SortOrder::RatingAsc => doc! { "rating_avg": 1, "_id": 1 },
        SortOrder::RatingDesc => doc! { "rating_avg": -1, "_id": 1 },
        SortOrder::FeesAsc => doc! { "skills.hourly_rate": 1, "_id": 1 },
        SortOrder::FeesDesc => doc! { "skills.hourly_rate": -1, "_id": 1 },
    }
}

fn geo_near_stage(query: &WorkerQuery, filter: Document) -> Option<Document> {
    let near = query.near.as_ref()?;
    Some(doc! {
        "$geoNear": {
            "near": {
                "type": "Point",
                "coordinates": [near.center.longitude(), near.center.latitude()]
            },
            "distanceField": "distance",
            "maxDistance": near.radius_meters,
            "spherical": true,
            "key": "location",
            "query": filter
        }
    })
}

fn request_filter(scope: &RequestScope) -> Document {
    match scope {
        RequestScope::Requester(id) => doc! { "requester": id },
        RequestScope::Assignee(id) => doc! { "worker": id },
        RequestScope::PendingNear {
            center,
            radius_meters,
        } => doc! {
            "status": RequestStatus::Pending.as_str(),
            "location": {
                "$geoWithin": {
                    "$centerSphere": [
                        [center.longitude(), center.latitude()],
                        radius_meters / EARTH_RADIUS_METERS
                    ]
                }
            }
        },
    }
}

fn review_filter(scope: ReviewScope) -> Document {
    match scope {
        ReviewScope::Author(id) => doc! { "author": id },
        ReviewScope::Worker(id) => doc! { "worker": id },
        ReviewScope::Request(id) => doc! { "request": id },
    }
}

fn count_field(doc: &Document, key: &str) -> u64 {
    match doc.get(key) {
        Some(Bson::Int32(n)) => *n as u64,
        Some(Bson::Int64(n)) => *n as u64,
        Some(Bson::Double(n)) => *n as u64,
        _ => 0,
    }
}

impl MongoStore {
    async fn search_near(&self, query: &WorkerQuery, geo_near: Document) -> StoreResult<SearchPage> {
        let mut pipeline = vec![geo_near.clone()];
        if let Some(sort) = query.sort {
            pipeline.push(doc! { "$sort": sort_document(sort) });
        }
        pipeline.push(doc! { "$skip": query.page.skip() as i64 });
        pipeline.push(doc! { "$limit": query.page.limit as i64 });

        let mut hits = Vec::new();
        for mut doc in collect(self.workers.aggregate(pipeline, None).await?).await? {
            let distance = doc.remove("distance").and_then(|d| d.as_f64());
            let worker: Worker = bson::from_document(doc)?;
            hits.push(WorkerHit { worker, distance });
        }

        let count_pipeline = vec![geo_near, doc! { "$count": "total" }];
        let total = collect(self.workers.aggregate(count_pipeline, None).await?)
            .await?
            .first()
            .map(|doc| count_field(doc, "total"))
            .unwrap_or(0);

        Ok(SearchPage { hits, total })
    }

    async fn search_all(&self, query: &WorkerQuery, filter: Document) -> StoreResult<SearchPage> {
        let mut options = FindOptions::builder()
            .skip(query.page.skip())
            .limit(query.page.limit as i64)
            .build();
        options.sort = query.sort.map(sort_document);

        let workers = collect(self.workers.find(filter.clone(), options).await?).await?;
        let total = self.workers.count_documents(filter, None).await?;

        Ok(SearchPage {
            hits: workers
                .into_iter()
                .map(|worker| WorkerHit {
                    worker,
                    distance: None,
                })
                .collect(),
            total,
        })
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users
            .insert_one(user, None)
            .await
            .map_err(|e| insert_error(e, USERS))?;
        Ok(())
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self.users.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users.find_one(doc! { "email": email }, None).await?)
    }

    async fn find_users(&self, ids: &[ObjectId]) -> StoreResult<Vec<User>> {
        let filter = doc! { "_id": { "$in": ids.to_vec() } };
        collect(self.users.find(filter, None).await?).await
    }

    async fn update_user(&self, id: ObjectId, changes: &ProfileChanges) -> StoreResult<Option<User>> {
        let set = changes_document(changes)?;
        Ok(self
            .users
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, return_updated())
            .await?)
    }

    async fn delete_user(&self, id: ObjectId) -> StoreResult<bool> {
        let result = self.users.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn insert_worker(&self, worker: &Worker) -> StoreResult<()> {
        self.workers
            .insert_one(worker, None)
            .await
            .map_err(|e| insert_error(e, WORKERS))?;
        Ok(())
    }

    async fn find_worker(&self, id: ObjectId) -> StoreResult<Option<Worker>> {
        Ok(self.workers.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_worker_by_email(&self, email: &str) -> StoreResult<Option<Worker>> {
        Ok(self.workers.find_one(doc! { "email": email }, None).await?)
    }

    async fn find_workers(&self, ids: &[ObjectId]) -> StoreResult<Vec<Worker>> {
        let filter = doc! { "_id": { "$in": ids.to_vec() } };
        collect(self.workers.find(filter, None).await?).await
    }

    async fn update_worker(
        &self,
        id: ObjectId,
        changes: &ProfileChanges,
    ) -> StoreResult<Option<Worker>> {
        let set = changes_document(changes)?;
        Ok(self
            .workers
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, return_updated())
            .await?)
    }

    async fn upsert_skill(&self, id: ObjectId, skill: &Skill) -> StoreResult<Option<Worker>> {
        let same_name = skill_name_match(&skill.name);

        // A concurrent push can land between the two conditional writes; one retry covers it.
        for _ in 0..2 {
            let updated = self
                .workers
                .find_one_and_update(
                    doc! { "_id": id, "skills": { "$elemMatch": same_name.clone() } },
                    doc! { "$set": {
                        "skills.$.hourly_rate": skill.hourly_rate,
                        "updated_at": DateTime::now(),
                    } },
                    return_updated(),
                )
                .await?;
            if updated.is_some() {
                return Ok(updated);
            }

            let pushed = self
                .workers
                .find_one_and_update(
                    doc! { "_id": id, "skills": { "$not": { "$elemMatch": same_name.clone() } } },
                    doc! {
                        "$push": { "skills": bson::to_bson(skill)? },
                        "$set": { "updated_at": DateTime::now() },
                    },
                    return_updated(),
                )
                .await?;
            if pushed.is_some() {
                return Ok(pushed);
            }

            if self.find_worker(id).await?.is_none() {
                return Ok(None);
            }
        }
        Ok(None)
    }

    async fn remove_skill(&self, id: ObjectId, name: &str) -> StoreResult<Option<Worker>> {
        let same_name = skill_name_match(name);
        Ok(self
            .workers
            .find_one_and_update(
                doc! { "_id": id, "skills": { "$elemMatch": same_name.clone() } },
                doc! {
                    "$pull": { "skills": same_name },
                    "$set": { "updated_at": DateTime::now() },
                },
                return_updated(),
            )
            .await?)
    }

    async fn set_availability(&self, id: ObjectId, available: bool) -> StoreResult<Option<Worker>> {
        Ok(self
            .workers
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "availability": available, "updated_at": DateTime::now() } },
                return_updated(),
            )
            .await?)
    }

    async fn set_rating(&self, id: ObjectId, stats: RatingStats) -> StoreResult<bool> {
        let result = self
            .workers
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "rating_avg": stats.average,
                    "reviews_count": stats.count,
                } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn increment_solved(&self, id: ObjectId) -> StoreResult<bool> {
        let result = self
            .workers
            .update_one(doc! { "_id": id }, doc! { "$inc": { "solved_count": 1 } }, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_worker(&self, id: ObjectId) -> StoreResult<bool> {
        let result = self.workers.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn search_workers(&self, query: &WorkerQuery) -> StoreResult<SearchPage> {
        let filter = worker_filter(query);
        match geo_near_stage(query, filter.clone()) {
            Some(geo_near) => self.search_near(query, geo_near).await,
            None => self.search_all(query, filter).await,
        }
    }

    async fn insert_request(&self, request: &ServiceRequest) -> StoreResult<()> {
        self.requests.insert_one(request, None).await?;
        Ok(())
    }

    async fn find_request(&self, id: ObjectId) -> StoreResult<Option<ServiceRequest>> {
        Ok(self.requests.find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_requests(&self, scope: &RequestScope) -> StoreResult<Vec<ServiceRequest>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1, "_id": -1 })
            .build();
        collect(self.requests.find(request_filter(scope), options).await?).await
    }

    async fn accept_request(
        &self,
        id: ObjectId,
        worker: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>> {
        Ok(self
            .requests
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "status": RequestStatus::Pending.as_str(),
                    "worker": null,
                },
                doc! { "$set": {
                    "worker": worker,
                    "status": RequestStatus::Accepted.as_str(),
                    "updated_at": DateTime::now(),
                } },
                return_updated(),
            )
            .await?)
    }

    async fn resolve_request(
        &self,
        id: ObjectId,
        worker: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>> {
        Ok(self
            .requests
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "worker": worker,
                    "status": RequestStatus::Accepted.as_str(),
                },
                doc! { "$set": {
                    "status": RequestStatus::Resolved.as_str(),
                    "updated_at": DateTime::now(),
                } },
                return_updated(),
            )
            .await?)
    }

    async fn delete_request(
        &self,
        id: ObjectId,
        requester: ObjectId,
    ) -> StoreResult<Option<ServiceRequest>> {
        Ok(self
            .requests
            .find_one_and_delete(doc! { "_id": id, "requester": requester }, None)
            .await?)
    }

    async fn delete_requests_by_requester(&self, requester: ObjectId) -> StoreResult<u64> {
        let result = self
            .requests
            .delete_many(doc! { "requester": requester }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn tombstone_requests(&self, worker: ObjectId, marker: &str) -> StoreResult<u64> {
        let result = self
            .requests
            .update_many(
                doc! { "worker": worker },
                doc! { "$set": {
                    "worker": null,
                    "worker_name": marker,
                    "updated_at": DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<()> {
        self.reviews
            .insert_one(review, None)
            .await
            .map_err(|e| insert_error(e, REVIEWS))?;
        Ok(())
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self.reviews.find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_reviews(&self, scope: ReviewScope) -> StoreResult<Vec<Review>> {
        collect(self.reviews.find(review_filter(scope), None).await?).await
    }

    async fn worker_reviews(&self, worker: ObjectId, page: Page) -> StoreResult<(Vec<Review>, u64)> {
        let filter = doc! { "worker": worker };
        let options = FindOptions::builder()
            .skip(page.skip())
            .limit(page.limit as i64)
            .sort(doc! { "created_at": -1, "_id": -1 })
            .build();

        let reviews = collect(self.reviews.find(filter.clone(), options).await?).await?;
        let total = self.reviews.count_documents(filter, None).await?;
        Ok((reviews, total))
    }

    async fn delete_review(&self, id: ObjectId, author: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self
            .reviews
            .find_one_and_delete(doc! { "_id": id, "author": author }, None)
            .await?)
    }

    async fn delete_reviews(&self, scope: ReviewScope) -> StoreResult<u64> {
        let result = self.reviews.delete_many(review_filter(scope), None).await?;
        Ok(result.deleted_count)
    }

    async fn rating_stats(&self, worker: ObjectId) -> StoreResult<RatingStats> {
        let pipeline = vec![
            doc! { "$match": { "worker": worker } },
            doc! { "$group": {
                "_id": "$worker",
                "average": { "$avg": "$rating" },
                "count": { "$sum": 1 },
            } },
        ];
        let groups = collect(self.reviews.aggregate(pipeline, None).await?).await?;
        Ok(match groups.first() {
            Some(group) => RatingStats {
                average: group.get_f64("average").unwrap_or(0.0),
                count: count_field(group, "count") as i32,
            },
            None => RatingStats::default(),
        })
    }
}
