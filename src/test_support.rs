//! Fixtures shared by the unit and route tests.

use async_trait::async_trait;
use mongodb::bson::{DateTime, oid::ObjectId};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::db::{MemoryStore, Store};
use crate::models::{
    Address, Coordinates, GeoLocation, RequestStatus, Role, ServiceRequest, Skill, User, Worker,
};
use crate::services::blob::{BlobError, BlobStore};
use crate::services::geocoder::{GeocodeError, Geocoder};
use crate::state::AppState;

/// Geocoder with a canned answer that records every query.
pub struct FixedGeocoder {
    answer: Option<Vec<Coordinates>>,
    queries: Mutex<Vec<String>>,
}

impl FixedGeocoder {
    pub fn answering(latitude: f64, longitude: f64) -> Self {
        FixedGeocoder {
            answer: Some(vec![Coordinates {
                latitude,
                longitude,
            }]),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        FixedGeocoder {
            answer: Some(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        FixedGeocoder {
            answer: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<Coordinates>, GeocodeError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.answer
            .clone()
            .ok_or_else(|| GeocodeError::Parse("service unavailable".into()))
    }
}

/// Blob store that keeps references in memory and can fail the first N deletions.
#[derive(Default)]
pub struct RecordingBlobStore {
    transient_failures: AtomicU32,
    attempts: AtomicU32,
    stored: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_transiently(times: u32) -> Self {
        RecordingBlobStore {
            transient_failures: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub fn delete_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        let mut deleted = self.deleted.lock().unwrap().clone();
        deleted.sort();
        deleted
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(&self, _bytes: Vec<u8>, extension: &str) -> Result<String, BlobError> {
        let mut stored = self.stored.lock().unwrap();
        let reference = format!("/uploads/blob-{}.{}", stored.len(), extension);
        stored.push(reference.clone());
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), BlobError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlobError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.deleted.lock().unwrap().push(reference.to_string());
        Ok(())
    }
}

pub const KHANNA: (f64, f64) = (76.2179, 30.7046);

/// An `AppState` over the in-memory store, plus handles on its collaborators.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub geocoder: Arc<FixedGeocoder>,
    pub blobs: Arc<RecordingBlobStore>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "test-secret".into(),
        bcrypt_cost: 4,
        blob_retry_base_ms: 1,
        ..AppConfig::default()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let geocoder = Arc::new(FixedGeocoder::answering(KHANNA.1, KHANNA.0));
        let blobs = Arc::new(RecordingBlobStore::new());
        let state = AppState::new(test_config(), store.clone(), geocoder.clone(), blobs.clone());
        TestApp {
            state,
            store,
            geocoder,
            blobs,
        }
    }

    pub async fn user(&self, name: &str, at: (f64, f64)) -> User {
        let now = DateTime::now();
        let user = User {
            id: ObjectId::new(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: String::new(),
            phone: Some("9876543210".into()),
            profile_photo: None,
            address: Address::new("Punjab", "Ludhiana", "Khanna"),
            location: GeoLocation::point(at.0, at.1),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn worker(&self, name: &str, worker_type: &str, at: (f64, f64)) -> Worker {
        let now = DateTime::now();
        let worker = Worker {
            id: ObjectId::new(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: String::new(),
            phone: Some("9123456780".into()),
            profile_photo: None,
            worker_type: worker_type.into(),
            experience_years: 4,
            solved_count: 0,
            availability: true,
            rating_avg: 0.0,
            reviews_count: 0,
            skills: vec![Skill {
                name: "General".into(),
                hourly_rate: 300.0,
            }],
            address: Address::new("Punjab", "Ludhiana", "Khanna"),
            location: GeoLocation::point(at.0, at.1),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_worker(&worker).await.unwrap();
        worker
    }

    pub async fn request(&self, requester: &User, photos: &[&str]) -> ServiceRequest {
        let now = DateTime::now();
        let request = ServiceRequest {
            id: ObjectId::new(),
            requester: requester.id,
            worker: None,
            worker_name: None,
            request_type: "plumbing".into(),
            description: Some("Leaking tap".into()),
            photos: photos.iter().map(|p| p.to_string()).collect(),
            address: requester.address.clone(),
            location: requester.location.clone(),
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_request(&request).await.unwrap();
        request
    }

    pub fn token(&self, id: ObjectId, role: Role) -> String {
        self.state.jwt.generate_access_token(&id, role).unwrap()
    }
}
