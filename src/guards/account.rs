use log::warn;
use rocket::request::{self, FromRequest, Outcome, Request};

use super::auth::{AuthGuard, app_state, reject};
use crate::models::{Role, User, Worker};
use crate::utils::ApiError;

/// Authenticated requester account, loaded from the store.
pub struct UserGuard(pub User);

/// Authenticated worker account, loaded from the store.
pub struct WorkerGuard(pub Worker);

async fn authenticate(req: &Request<'_>, role: Role) -> Result<AuthGuard, ApiError> {
    let auth = match req.guard::<AuthGuard>().await {
        Outcome::Success(auth) => auth,
        Outcome::Error((_, e)) => return Err(e),
        Outcome::Forward(_) => return Err(ApiError::unauthenticated("Authentication required")),
    };

    if auth.role != role {
        return Err(ApiError::forbidden(format!(
            "This action requires a {} account",
            role.as_str()
        )));
    }
    Ok(auth)
}

fn account_gone(role: Role, auth: &AuthGuard) -> ApiError {
    warn!("Token for missing {} account {}", role.as_str(), auth.account_id);
    ApiError::unauthenticated("Account no longer exists")
}

async fn load_user(req: &Request<'_>) -> Result<User, ApiError> {
    let auth = authenticate(req, Role::User).await?;
    app_state(req)?
        .store
        .find_user(auth.account_id)
        .await?
        .ok_or_else(|| account_gone(Role::User, &auth))
}

async fn load_worker(req: &Request<'_>) -> Result<Worker, ApiError> {
    let auth = authenticate(req, Role::Worker).await?;
    app_state(req)?
        .store
        .find_worker(auth.account_id)
        .await?
        .ok_or_else(|| account_gone(Role::Worker, &auth))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserGuard {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match load_user(req).await {
            Ok(user) => Outcome::Success(UserGuard(user)),
            Err(e) => reject(req, e),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for WorkerGuard {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match load_worker(req).await {
            Ok(worker) => Outcome::Success(WorkerGuard(worker)),
            Err(e) => reject(req, e),
        }
    }
}
