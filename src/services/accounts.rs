use log::info;
use mongodb::bson::{DateTime, oid::ObjectId};
use validator::Validate;

use crate::db::StoreError;
use crate::models::{
    Account, AccountSummary, AuthResponse, GeoLocation, LoginDto, ProfileChanges, Role,
    SignupDto, UpdateLocationDto, UpdateUserProfileDto, UpdateWorkerProfileDto, User, Worker,
};
use crate::services::geocoder::resolve_location;
use crate::state::AppState;
use crate::utils::{ApiError, normalize_email, validate_coordinates, validate_mobile};

pub struct AccountService;

async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::internal_error(format!("Hashing task failed: {}", e)))?
        .map_err(|e| ApiError::internal_error(format!("Password hashing failed: {}", e)))
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::internal_error(format!("Hashing task failed: {}", e)))?
        // A malformed stored hash can never match.
        .or(Ok(false))
}

fn checked_phone(phone: Option<String>) -> Result<Option<String>, ApiError> {
    match phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) {
        Some(phone) if !validate_mobile(&phone) => {
            Err(ApiError::validation("Invalid phone number"))
        }
        phone => Ok(phone),
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Trims an optional field; a value that is blank after trimming is rejected.
fn non_blank(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    match trimmed(value) {
        Some(v) if v.is_empty() => Err(ApiError::validation(format!("{field} cannot be blank"))),
        other => Ok(other),
    }
}

fn email_taken(err: StoreError) -> ApiError {
    match err {
        StoreError::Duplicate(_) => ApiError::conflict("Email already in use"),
        other => other.into(),
    }
}

impl AccountService {
    fn issue_token(state: &AppState, account: &dyn Account) -> Result<AuthResponse, ApiError> {
        let token = state
            .jwt
            .generate_access_token(&account.account_id(), account.role())
            .map_err(|e| ApiError::internal_error(format!("Token generation failed: {}", e)))?;

        Ok(AuthResponse {
            token,
            user: AccountSummary::of(account),
        })
    }

    pub async fn signup(state: &AppState, dto: SignupDto) -> Result<AuthResponse, ApiError> {
        dto.validate()?;

        let name = dto.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::validation("Name cannot be blank"));
        }
        let role = dto.role.unwrap_or(Role::User);
        let worker_type = trimmed(dto.worker_type.clone()).filter(|t| !t.is_empty());
        if role == Role::Worker && worker_type.is_none() {
            return Err(ApiError::validation("Worker type is required"));
        }

        let email = normalize_email(&dto.email);
        let phone = checked_phone(dto.phone.clone())?;

        // Emails are unique across both account collections.
        if state.store.find_user_by_email(&email).await?.is_some()
            || state.store.find_worker_by_email(&email).await?.is_some()
        {
            return Err(ApiError::conflict("Email already in use"));
        }

        let address = dto.address();
        let location = match dto.location {
            Some(coords) => GeoLocation::from(validate_coordinates(coords.latitude, coords.longitude)?),
            None => resolve_location(state.geocoder.as_ref(), &address).await,
        };

        let password_hash = hash_password(dto.password, state.config.bcrypt_cost).await?;
        let now = DateTime::now();

        let response = match role {
            Role::User => {
                let user = User {
                    id: ObjectId::new(),
                    name,
                    email,
                    password_hash,
                    phone,
                    profile_photo: None,
                    address,
                    location,
                    created_at: now,
                    updated_at: now,
                };
                state.store.insert_user(&user).await.map_err(email_taken)?;
                Self::issue_token(state, &user)?
            }
            Role::Worker => {
                let worker = Worker {
                    id: ObjectId::new(),
                    name,
                    email,
                    password_hash,
                    phone,
                    profile_photo: None,
                    worker_type: worker_type.unwrap_or_default(),
                    experience_years: dto.experience_years.unwrap_or(0),
                    solved_count: 0,
                    availability: true,
                    rating_avg: 0.0,
                    reviews_count: 0,
                    skills: Vec::new(),
                    address,
                    location,
                    created_at: now,
                    updated_at: now,
                };
                state.store.insert_worker(&worker).await.map_err(email_taken)?;
                Self::issue_token(state, &worker)?
            }
        };

        info!("New {} account {}", role.as_str(), response.user.id);
        Ok(response)
    }

    /// Users are checked before workers.
    pub async fn login(state: &AppState, dto: LoginDto) -> Result<AuthResponse, ApiError> {
        dto.validate()?;
        let email = normalize_email(&dto.email);

        let account: Box<dyn Account + Send> = match state.store.find_user_by_email(&email).await? {
            Some(user) => Box::new(user),
            None => match state.store.find_worker_by_email(&email).await? {
                Some(worker) => Box::new(worker),
                None => return Err(ApiError::unauthenticated("Invalid credentials")),
            },
        };

        if !verify_password(dto.password, account.password_hash().to_string()).await? {
            return Err(ApiError::unauthenticated("Invalid credentials"));
        }

        Self::issue_token(state, account.as_ref())
    }

    pub async fn update_user_profile(
        state: &AppState,
        user: &User,
        dto: UpdateUserProfileDto,
    ) -> Result<User, ApiError> {
        dto.validate()?;

        let changes = ProfileChanges {
            name: non_blank(dto.name, "Name")?,
            phone: checked_phone(dto.phone)?,
            profile_photo: trimmed(dto.profile_photo).filter(|p| !p.is_empty()),
            ..ProfileChanges::default()
        };
        if changes.is_empty() {
            return Ok(user.clone());
        }

        let updated = state
            .store
            .update_user(user.id, &changes)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        Self::discard_replaced_photo(state, user.profile_photo.as_deref(), &changes).await;
        Ok(updated)
    }

    pub async fn update_worker_profile(
        state: &AppState,
        worker: &Worker,
        dto: UpdateWorkerProfileDto,
    ) -> Result<Worker, ApiError> {
        dto.validate()?;

        let changes = ProfileChanges {
            name: non_blank(dto.name, "Name")?,
            phone: checked_phone(dto.phone)?,
            profile_photo: trimmed(dto.profile_photo).filter(|p| !p.is_empty()),
            worker_type: non_blank(dto.worker_type, "Worker type")?,
            experience_years: dto.experience_years,
            location: None,
        };
        if changes.is_empty() {
            return Ok(worker.clone());
        }

        let updated = state
            .store
            .update_worker(worker.id, &changes)
            .await?
            .ok_or_else(|| ApiError::not_found("Worker not found"))?;

        Self::discard_replaced_photo(state, worker.profile_photo.as_deref(), &changes).await;
        Ok(updated)
    }

    pub async fn update_worker_location(
        state: &AppState,
        worker: &Worker,
        dto: UpdateLocationDto,
    ) -> Result<Worker, ApiError> {
        let coordinates = validate_coordinates(dto.latitude, dto.longitude)?;
        let changes = ProfileChanges {
            location: Some(coordinates.into()),
            ..ProfileChanges::default()
        };

        state
            .store
            .update_worker(worker.id, &changes)
            .await?
            .ok_or_else(|| ApiError::not_found("Worker not found"))
    }

    pub async fn worker_public_profile(state: &AppState, id: ObjectId) -> Result<Worker, ApiError> {
        state
            .store
            .find_worker(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Worker not found"))
    }

    async fn discard_replaced_photo(state: &AppState, old: Option<&str>, changes: &ProfileChanges) {
        if let (Some(old), Some(new)) = (old, changes.profile_photo.as_deref()) {
            if old != new {
                state.discard_blobs([old]).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;
    use crate::test_support::{KHANNA, TestApp};
    use crate::utils::ErrorKind;

    fn signup(email: &str, role: Option<Role>) -> SignupDto {
        SignupDto {
            name: "Asha".into(),
            email: email.into(),
            password: "hunter22".into(),
            role,
            worker_type: role.filter(|r| *r == Role::Worker).map(|_| "plumber".into()),
            state: "Punjab".into(),
            district: "Ludhiana".into(),
            tehsil: "Khanna".into(),
            ..SignupDto::default()
        }
    }

    fn login(email: &str, password: &str) -> LoginDto {
        LoginDto {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn signup_then_login() {
        let app = TestApp::new();
        let created = AccountService::signup(&app.state, signup("Asha@Example.com", None))
            .await
            .unwrap();
        assert_eq!(created.user.role, Role::User);

        let stored = app.state.store.find_user_by_email("asha@example.com").await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "hunter22");
        assert_eq!(stored.location, GeoLocation::point(KHANNA.0, KHANNA.1));

        let session = AccountService::login(&app.state, login("asha@example.com", "hunter22"))
            .await
            .unwrap();
        let claims = app.state.jwt.verify_token(&session.token).unwrap();
        assert_eq!(claims.sub, stored.id.to_hex());
        assert_eq!(claims.role, Role::User);

        let err = AccountService::login(&app.state, login("asha@example.com", "wrong-pass"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn worker_login_falls_through_to_workers() {
        let app = TestApp::new();
        AccountService::signup(&app.state, signup("ravi@example.com", Some(Role::Worker)))
            .await
            .unwrap();
        let session = AccountService::login(&app.state, login("ravi@example.com", "hunter22"))
            .await
            .unwrap();
        assert_eq!(session.user.role, Role::Worker);
    }

    #[tokio::test]
    async fn email_is_unique_across_roles() {
        let app = TestApp::new();
        AccountService::signup(&app.state, signup("dup@example.com", Some(Role::Worker)))
            .await
            .unwrap();
        let err = AccountService::signup(&app.state, signup("DUP@example.com", None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn signup_validation() {
        let app = TestApp::new();
        let mut dto = signup("x@example.com", Some(Role::Worker));
        dto.worker_type = None;
        let err = AccountService::signup(&app.state, dto).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let mut dto = signup("x@example.com", None);
        dto.password = String::new();
        assert!(AccountService::signup(&app.state, dto).await.is_err());

        let mut dto = signup("x@example.com", None);
        dto.location = Some(Coordinates { latitude: 120.0, longitude: 0.0 });
        assert!(AccountService::signup(&app.state, dto).await.is_err());
    }

    #[tokio::test]
    async fn supplied_coordinates_skip_geocoding() {
        let app = TestApp::new();
        let mut dto = signup("geo@example.com", None);
        dto.location = Some(Coordinates { latitude: 31.0, longitude: 75.0 });
        AccountService::signup(&app.state, dto).await.unwrap();

        let user = app.state.store.find_user_by_email("geo@example.com").await.unwrap().unwrap();
        assert_eq!(user.location, GeoLocation::point(75.0, 31.0));
        assert!(app.geocoder.queries().is_empty());
    }

    #[tokio::test]
    async fn replacing_profile_photo_discards_the_old_blob() {
        let app = TestApp::new();
        let mut user = app.user("Meera", KHANNA).await;
        user = AccountService::update_user_profile(
            &app.state,
            &user,
            UpdateUserProfileDto {
                profile_photo: Some("/uploads/old.jpg".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(app.blobs.deleted().is_empty());

        let updated = AccountService::update_user_profile(
            &app.state,
            &user,
            UpdateUserProfileDto {
                name: Some("Meera K".into()),
                profile_photo: Some("/uploads/new.jpg".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Meera K");
        assert_eq!(updated.profile_photo.as_deref(), Some("/uploads/new.jpg"));
        assert_eq!(app.blobs.deleted(), ["/uploads/old.jpg"]);
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let app = TestApp::new();
        let user = app.user("Meera", KHANNA).await;
        let err = AccountService::update_user_profile(
            &app.state,
            &user,
            UpdateUserProfileDto {
                name: Some("   ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let stored = app.state.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Meera");

        let worker = app.worker("Ravi", "plumber", KHANNA).await;
        for dto in [
            UpdateWorkerProfileDto {
                name: Some(" \t ".into()),
                ..Default::default()
            },
            UpdateWorkerProfileDto {
                worker_type: Some("  ".into()),
                ..Default::default()
            },
        ] {
            let err = AccountService::update_worker_profile(&app.state, &worker, dto)
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);
        }

        let mut dto = signup("blank@example.com", None);
        dto.name = "   ".into();
        let err = AccountService::signup(&app.state, dto).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn worker_location_is_range_checked() {
        let app = TestApp::new();
        let worker = app.worker("Ravi", "plumber", KHANNA).await;

        let err = AccountService::update_worker_location(
            &app.state,
            &worker,
            UpdateLocationDto { latitude: 95.0, longitude: 10.0 },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let moved = AccountService::update_worker_location(
            &app.state,
            &worker,
            UpdateLocationDto { latitude: 30.9, longitude: 75.85 },
        )
        .await
        .unwrap();
        assert_eq!(moved.location, GeoLocation::point(75.85, 30.9));
    }
}
