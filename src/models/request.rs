use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Address, Coordinates, GeoLocation};

/// Placeholder written in place of a deleted worker's reference.
pub const DELETED_WORKER: &str = "Deleted Worker";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Resolved,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceRequest {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub requester: ObjectId,
    pub worker: Option<ObjectId>,
    /// Tombstone left behind when the assigned worker deletes their account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    #[serde(rename = "type")]
    pub request_type: String,
    pub description: Option<String>,
    pub photos: Vec<String>,
    pub address: Address,
    pub location: GeoLocation,
    pub status: RequestStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl ServiceRequest {
    pub fn is_tombstoned(&self) -> bool {
        self.worker.is_none() && self.worker_name.as_deref() == Some(DELETED_WORKER)
    }

    /// `worker` is unset exactly while the request is pending, unless the worker's
    /// account was deleted after acceptance.
    pub fn assignment_consistent(&self) -> bool {
        if self.is_tombstoned() {
            return self.status != RequestStatus::Pending;
        }
        self.worker.is_none() == (self.status == RequestStatus::Pending)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreateRequestDto {
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "Request type is required"))]
    pub request_type: String,
    pub description: Option<String>,
    /// Blob references returned by the upload endpoint.
    #[validate(length(max = 5, message = "At most 5 photos per request"))]
    pub photos: Vec<String>,
    pub state: String,
    pub district: String,
    pub tehsil: String,
    /// Coordinates captured by the client; highest priority location source.
    pub location: Option<Coordinates>,
    /// Reuse the requester's stored location when no coordinates are supplied.
    pub use_saved_location: bool,
}

impl CreateRequestDto {
    pub fn address(&self) -> Address {
        Address::new(self.state.trim(), self.district.trim(), self.tehsil.trim())
    }
}

#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct DashboardStats {
    pub total: u64,
    pub pending: u64,
    pub accepted: u64,
    pub resolved: u64,
}

impl DashboardStats {
    pub fn tally<'a>(requests: impl IntoIterator<Item = &'a ServiceRequest>) -> Self {
        let mut stats = DashboardStats::default();
        for request in requests {
            stats.total += 1;
            match request.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Accepted => stats.accepted += 1,
                RequestStatus::Resolved => stats.resolved += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub id: String,
    pub requester: String,
    pub worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    #[serde(rename = "type")]
    pub request_type: String,
    pub description: Option<String>,
    pub photos: Vec<String>,
    pub address: Address,
    pub location: GeoLocation,
    pub status: RequestStatus,
    pub created_at: ChronoDateTime<Utc>,
}

impl From<ServiceRequest> for RequestResponse {
    fn from(request: ServiceRequest) -> Self {
        RequestResponse {
            id: request.id.to_hex(),
            requester: request.requester.to_hex(),
            worker: request.worker.map(|w| w.to_hex()),
            worker_name: request.worker_name,
            request_type: request.request_type,
            description: request.description,
            photos: request.photos,
            address: request.address,
            location: request.location,
            status: request.status,
            created_at: request.created_at.to_chrono(),
        }
    }
}

/// Assigned worker as shown on the requester's dashboard.
#[derive(Debug, Serialize)]
pub struct AssigneeView {
    pub id: Option<String>,
    pub name: String,
    pub worker_type: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserDashboardEntry {
    #[serde(flatten)]
    pub request: RequestResponse,
    pub assignee: Option<AssigneeView>,
}

#[derive(Debug, Serialize)]
pub struct UserDashboard {
    pub stats: DashboardStats,
    pub requests: Vec<UserDashboardEntry>,
}

/// Requester as shown on a worker's dashboard; the phone number is only revealed to the
/// worker assigned to the request.
#[derive(Debug, Serialize)]
pub struct RequesterView {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkerDashboardEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub description: Option<String>,
    pub status: RequestStatus,
    pub photos: Vec<String>,
    pub requester: RequesterView,
    pub address: Address,
    pub created_at: ChronoDateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WorkerDashboard {
    pub stats: DashboardStats,
    pub requests: Vec<WorkerDashboardEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: RequestStatus, worker: Option<ObjectId>) -> ServiceRequest {
        let now = DateTime::now();
        ServiceRequest {
            id: ObjectId::new(),
            requester: ObjectId::new(),
            worker,
            worker_name: None,
            request_type: "plumbing".into(),
            description: None,
            photos: vec![],
            address: Address::default(),
            location: GeoLocation::origin(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn assignment_tracks_status() {
        assert!(request(RequestStatus::Pending, None).assignment_consistent());
        assert!(request(RequestStatus::Accepted, Some(ObjectId::new())).assignment_consistent());
        assert!(!request(RequestStatus::Accepted, None).assignment_consistent());
        assert!(!request(RequestStatus::Pending, Some(ObjectId::new())).assignment_consistent());
    }

    #[test]
    fn tombstone_keeps_status() {
        let mut r = request(RequestStatus::Resolved, None);
        r.worker_name = Some(DELETED_WORKER.into());
        assert!(r.is_tombstoned());
        assert!(r.assignment_consistent());
    }

    #[test]
    fn tally_counts_each_status() {
        let requests = vec![
            request(RequestStatus::Pending, None),
            request(RequestStatus::Pending, None),
            request(RequestStatus::Accepted, Some(ObjectId::new())),
            request(RequestStatus::Resolved, Some(ObjectId::new())),
        ];
        let stats = DashboardStats::tally(&requests);
        assert_eq!(
            stats,
            DashboardStats { total: 4, pending: 2, accepted: 1, resolved: 1 }
        );
    }
}
