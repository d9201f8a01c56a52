use mongodb::bson::oid::ObjectId;
use rocket::request::{self, FromRequest, Outcome, Request};

use crate::models::Role;
use crate::state::AppState;
use crate::utils::ApiError;

/// Why a guard rejected the request, picked up by the catchers.
#[derive(Debug, Default)]
pub struct GuardFailure(pub Option<ApiError>);

/// Records `error` for the catcher and fails the guard with its status.
pub(crate) fn reject<T>(req: &Request<'_>, error: ApiError) -> request::Outcome<T, ApiError> {
    let status = error.status();
    req.local_cache(|| GuardFailure(Some(error.clone())));
    Outcome::Error((status, error))
}

pub(crate) fn app_state<'r>(req: &'r Request<'_>) -> Result<&'r AppState, ApiError> {
    req.rocket()
        .state::<AppState>()
        .ok_or_else(|| ApiError::internal_error("Application state not initialised"))
}

/// JWT-based authentication guard. Proves identity only; the account may since have been
/// deleted.
#[derive(Debug, Clone, Copy)]
pub struct AuthGuard {
    pub account_id: ObjectId,
    pub role: Role,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let state = match app_state(req) {
            Ok(state) => state,
            Err(e) => return reject(req, e),
        };

        let Some(header) = req.headers().get_one("Authorization") else {
            return reject(req, ApiError::unauthenticated("Authentication required"));
        };
        let Some(token) = header.strip_prefix("Bearer ").map(str::trim) else {
            return reject(req, ApiError::unauthenticated("Malformed Authorization header"));
        };

        match state.jwt.verify_token(token) {
            Ok(claims) => match ObjectId::parse_str(&claims.sub) {
                Ok(account_id) => Outcome::Success(AuthGuard {
                    account_id,
                    role: claims.role,
                }),
                Err(_) => reject(req, ApiError::unauthenticated("Invalid or expired token")),
            },
            Err(_) => reject(req, ApiError::unauthenticated("Invalid or expired token")),
        }
    }
}
