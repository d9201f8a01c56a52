//! Request lifecycle: `pending -> accepted -> resolved`.
//!
//! Transitions are compare-and-swap updates in the store; when one does not apply, the
//! request is re-read only to pick the error kind.

use log::info;
use mongodb::bson::{DateTime, oid::ObjectId};
use std::collections::{HashMap, HashSet};
use validator::Validate;

use crate::db::RequestScope;
use crate::models::{
    AssigneeView, CreateRequestDto, DashboardStats, GeoLocation, RequestResponse, RequestStatus,
    RequesterView, Role, ServiceRequest, User, UserDashboard, UserDashboardEntry, Worker,
    WorkerDashboard, WorkerDashboardEntry,
};
use crate::services::geocoder::resolve_location;
use crate::state::AppState;
use crate::utils::{ApiError, validate_coordinates};

pub struct RequestService;

impl RequestService {
    /// Location priority: supplied coordinates, the requester's saved location when asked
    /// for, then the geocoded address. Falls back to the origin sentinel.
    async fn request_location(
        state: &AppState,
        requester: &User,
        dto: &CreateRequestDto,
    ) -> Result<GeoLocation, ApiError> {
        if let Some(coords) = dto.location {
            return Ok(validate_coordinates(coords.latitude, coords.longitude)?.into());
        }
        if dto.use_saved_location {
            return Ok(requester.location.clone());
        }
        Ok(resolve_location(state.geocoder.as_ref(), &dto.address()).await)
    }

    pub async fn create(
        state: &AppState,
        requester: &User,
        dto: CreateRequestDto,
    ) -> Result<ServiceRequest, ApiError> {
        dto.validate()?;
        let request_type = dto.request_type.trim().to_string();
        if request_type.is_empty() {
            return Err(ApiError::validation("Request type is required"));
        }

        let location = Self::request_location(state, requester, &dto).await?;
        let now = DateTime::now();
        let request = ServiceRequest {
            id: ObjectId::new(),
            requester: requester.id,
            worker: None,
            worker_name: None,
            request_type,
            description: dto
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            photos: dto
                .photos
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            address: dto.address(),
            location,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        state.store.insert_request(&request).await?;
        info!("Request {} created by {}", request.id, requester.id);
        Ok(request)
    }

    pub async fn accept(
        state: &AppState,
        worker: &Worker,
        request_id: ObjectId,
    ) -> Result<ServiceRequest, ApiError> {
        if let Some(request) = state.store.accept_request(request_id, worker.id).await? {
            info!("Request {} accepted by {}", request.id, worker.id);
            return Ok(request);
        }

        match state.store.find_request(request_id).await? {
            None => Err(ApiError::not_found("Request not found")),
            Some(_) => Err(ApiError::conflict("Request already accepted or resolved")),
        }
    }

    pub async fn resolve(
        state: &AppState,
        worker: &Worker,
        request_id: ObjectId,
    ) -> Result<ServiceRequest, ApiError> {
        if let Some(request) = state.store.resolve_request(request_id, worker.id).await? {
            state.store.increment_solved(worker.id).await?;
            info!("Request {} resolved by {}", request.id, worker.id);
            return Ok(request);
        }

        match state.store.find_request(request_id).await? {
            None => Err(ApiError::not_found("Request not found")),
            Some(request) if request.worker != Some(worker.id) => {
                Err(ApiError::conflict("You did not accept this request"))
            }
            Some(_) => Err(ApiError::conflict("Request already resolved")),
        }
    }

    /// Counts over the caller's own requests (users) or assignments (workers).
    pub async fn stats(
        state: &AppState,
        account_id: ObjectId,
        role: Role,
    ) -> Result<DashboardStats, ApiError> {
        let scope = match role {
            Role::User => RequestScope::Requester(account_id),
            Role::Worker => RequestScope::Assignee(account_id),
        };
        let requests = state.store.list_requests(&scope).await?;
        Ok(DashboardStats::tally(&requests))
    }

    pub async fn user_dashboard(state: &AppState, user: &User) -> Result<UserDashboard, ApiError> {
        let requests = state
            .store
            .list_requests(&RequestScope::Requester(user.id))
            .await?;

        let worker_ids: Vec<ObjectId> = requests
            .iter()
            .filter_map(|r| r.worker)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let workers: HashMap<ObjectId, Worker> = state
            .store
            .find_workers(&worker_ids)
            .await?
            .into_iter()
            .map(|w| (w.id, w))
            .collect();

        let stats = DashboardStats::tally(&requests);
        let requests = requests
            .into_iter()
            .map(|request| {
                let assignee = match (request.worker, request.worker_name.as_ref()) {
                    (Some(id), _) => workers.get(&id).map(|w| AssigneeView {
                        id: Some(w.id.to_hex()),
                        name: w.name.clone(),
                        worker_type: Some(w.worker_type.clone()),
                        phone: w.phone.clone(),
                    }),
                    (None, Some(placeholder)) => Some(AssigneeView {
                        id: None,
                        name: placeholder.clone(),
                        worker_type: None,
                        phone: None,
                    }),
                    (None, None) => None,
                };
                UserDashboardEntry {
                    request: RequestResponse::from(request),
                    assignee,
                }
            })
            .collect();

        Ok(UserDashboard { stats, requests })
    }

    /// Assigned requests first, then pending requests nearby that nobody took yet.
    pub async fn worker_dashboard(
        state: &AppState,
        worker: &Worker,
    ) -> Result<WorkerDashboard, ApiError> {
        let mut requests = state
            .store
            .list_requests(&RequestScope::Assignee(worker.id))
            .await?;

        // The origin sentinel means the worker's location is unknown.
        if !worker.location.is_origin() {
            let nearby = state
                .store
                .list_requests(&RequestScope::PendingNear {
                    center: worker.location.clone(),
                    radius_meters: state.config.dashboard_radius,
                })
                .await?;
            let seen: HashSet<ObjectId> = requests.iter().map(|r| r.id).collect();
            requests.extend(nearby.into_iter().filter(|r| !seen.contains(&r.id)));
        }

        let requester_ids: Vec<ObjectId> = requests
            .iter()
            .map(|r| r.requester)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let requesters: HashMap<ObjectId, User> = state
            .store
            .find_users(&requester_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let stats = DashboardStats::tally(&requests);
        let requests = requests
            .into_iter()
            .map(|request| {
                let requester = requesters.get(&request.requester);
                let assigned_to_caller = request.worker == Some(worker.id);
                WorkerDashboardEntry {
                    id: request.id.to_hex(),
                    request_type: request.request_type,
                    description: request.description,
                    status: request.status,
                    photos: request.photos,
                    requester: RequesterView {
                        name: requester.map(|u| u.name.clone()),
                        phone: requester
                            .filter(|_| assigned_to_caller)
                            .and_then(|u| u.phone.clone()),
                    },
                    address: request.address,
                    created_at: request.created_at.to_chrono(),
                }
            })
            .collect();

        Ok(WorkerDashboard { stats, requests })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;
    use crate::test_support::{KHANNA, TestApp};
    use crate::utils::ErrorKind;
    use std::sync::Arc;

    fn dto(request_type: &str) -> CreateRequestDto {
        CreateRequestDto {
            request_type: request_type.into(),
            state: "Punjab".into(),
            district: "Ludhiana".into(),
            tehsil: "Khanna".into(),
            ..CreateRequestDto::default()
        }
    }

    #[tokio::test]
    async fn create_resolves_location_in_priority_order() {
        let app = TestApp::new();
        let user = app.user("Asha", (75.0, 31.0)).await;

        let mut with_coords = dto("plumbing");
        with_coords.location = Some(Coordinates { latitude: 30.5, longitude: 76.5 });
        with_coords.use_saved_location = true;
        let r = RequestService::create(&app.state, &user, with_coords).await.unwrap();
        assert_eq!(r.location, GeoLocation::point(76.5, 30.5));

        let mut saved = dto("plumbing");
        saved.use_saved_location = true;
        let r = RequestService::create(&app.state, &user, saved).await.unwrap();
        assert_eq!(r.location, GeoLocation::point(75.0, 31.0));
        assert!(app.geocoder.queries().is_empty());

        let r = RequestService::create(&app.state, &user, dto("plumbing")).await.unwrap();
        assert_eq!(r.location, GeoLocation::point(KHANNA.0, KHANNA.1));
        assert_eq!(r.status, RequestStatus::Pending);
        assert_eq!(r.worker, None);
    }

    #[tokio::test]
    async fn create_requires_type_and_caps_photos() {
        let app = TestApp::new();
        let user = app.user("Asha", KHANNA).await;

        let err = RequestService::create(&app.state, &user, dto("  ")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let mut many = dto("plumbing");
        many.photos = (0..6).map(|i| format!("/uploads/{i}.jpg")).collect();
        assert!(RequestService::create(&app.state, &user, many).await.is_err());
    }

    #[tokio::test]
    async fn second_accept_conflicts_and_keeps_first_worker() {
        let app = TestApp::new();
        let user = app.user("Asha", KHANNA).await;
        let first = app.worker("Ravi", "plumber", KHANNA).await;
        let second = app.worker("Vikram", "plumber", KHANNA).await;
        let request = app.request(&user, &[]).await;

        let accepted = RequestService::accept(&app.state, &first, request.id).await.unwrap();
        assert_eq!(accepted.worker, Some(first.id));
        assert!(accepted.assignment_consistent());

        let err = RequestService::accept(&app.state, &second, request.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        let stored = app.state.store.find_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.worker, Some(first.id));

        let err = RequestService::accept(&app.state, &second, ObjectId::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn concurrent_accepts_have_one_winner() {
        let app = Arc::new(TestApp::new());
        let user = app.user("Asha", KHANNA).await;
        let request_id = app.request(&user, &[]).await.id;
        let mut workers = Vec::new();
        for i in 0..8 {
            workers.push(app.worker(&format!("W{i}"), "plumber", KHANNA).await);
        }

        let handles: Vec<_> = workers
            .into_iter()
            .map(|worker| {
                let app = app.clone();
                tokio::spawn(async move {
                    RequestService::accept(&app.state, &worker, request_id).await.is_ok()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn resolve_checks_assignee_and_counts() {
        let app = TestApp::new();
        let user = app.user("Asha", KHANNA).await;
        let ravi = app.worker("Ravi", "plumber", KHANNA).await;
        let other = app.worker("Vikram", "plumber", KHANNA).await;
        let request = app.request(&user, &[]).await;

        let err = RequestService::resolve(&app.state, &ravi, request.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        RequestService::accept(&app.state, &ravi, request.id).await.unwrap();
        let err = RequestService::resolve(&app.state, &other, request.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let resolved = RequestService::resolve(&app.state, &ravi, request.id).await.unwrap();
        assert_eq!(resolved.status, RequestStatus::Resolved);
        let err = RequestService::resolve(&app.state, &ravi, request.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let stored = app.state.store.find_worker(ravi.id).await.unwrap().unwrap();
        assert_eq!(stored.solved_count, 1);
    }

    #[tokio::test]
    async fn stats_follow_the_callers_role() {
        let app = TestApp::new();
        let user = app.user("Asha", KHANNA).await;
        let ravi = app.worker("Ravi", "plumber", KHANNA).await;
        let a = app.request(&user, &[]).await;
        let b = app.request(&user, &[]).await;
        app.request(&user, &[]).await;
        RequestService::accept(&app.state, &ravi, a.id).await.unwrap();
        RequestService::accept(&app.state, &ravi, b.id).await.unwrap();
        RequestService::resolve(&app.state, &ravi, b.id).await.unwrap();

        let mine = RequestService::stats(&app.state, user.id, Role::User).await.unwrap();
        assert_eq!(mine, DashboardStats { total: 3, pending: 1, accepted: 1, resolved: 1 });

        let assigned = RequestService::stats(&app.state, ravi.id, Role::Worker).await.unwrap();
        assert_eq!(assigned, DashboardStats { total: 2, pending: 0, accepted: 1, resolved: 1 });
    }

    #[tokio::test]
    async fn worker_dashboard_hides_phone_until_assigned() {
        let app = TestApp::new();
        let user = app.user("Asha", KHANNA).await;
        let ravi = app.worker("Ravi", "plumber", KHANNA).await;
        let far_user = app.user("Far", (77.5, 28.6)).await;

        let open = app.request(&user, &[]).await;
        let taken = app.request(&user, &[]).await;
        app.request(&far_user, &[]).await;
        RequestService::accept(&app.state, &ravi, taken.id).await.unwrap();

        let dashboard = RequestService::worker_dashboard(&app.state, &ravi).await.unwrap();
        assert_eq!(dashboard.stats.total, 2);
        assert_eq!(dashboard.requests[0].id, taken.id.to_hex());
        assert_eq!(dashboard.requests[0].requester.phone.as_deref(), Some("9876543210"));
        assert_eq!(dashboard.requests[1].id, open.id.to_hex());
        assert_eq!(dashboard.requests[1].requester.name.as_deref(), Some("Asha"));
        assert_eq!(dashboard.requests[1].requester.phone, None);
    }

    #[tokio::test]
    async fn user_dashboard_shows_assignee() {
        let app = TestApp::new();
        let user = app.user("Asha", KHANNA).await;
        let ravi = app.worker("Ravi", "plumber", KHANNA).await;
        let request = app.request(&user, &[]).await;
        app.request(&user, &[]).await;
        RequestService::accept(&app.state, &ravi, request.id).await.unwrap();

        let dashboard = RequestService::user_dashboard(&app.state, &user).await.unwrap();
        assert_eq!(dashboard.stats.total, 2);
        let assigned = dashboard
            .requests
            .iter()
            .find(|e| e.request.id == request.id.to_hex())
            .unwrap();
        let assignee = assigned.assignee.as_ref().unwrap();
        assert_eq!(assignee.name, "Ravi");
        assert_eq!(assignee.worker_type.as_deref(), Some("plumber"));
        assert!(dashboard.requests.iter().any(|e| e.assignee.is_none()));
    }
}
