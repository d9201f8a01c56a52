use rocket::Request;
use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// -----------------------------
/// Generic API response
/// -----------------------------
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            code: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            code: None,
            data: Some(data),
        }
    }

    pub fn error(kind: ErrorKind, message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            message: Some(message),
            code: Some(kind.code().to_string()),
            data: None,
        }
    }
}

/// -----------------------------
/// Error taxonomy
/// -----------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Dependency,
    Internal,
}

impl ErrorKind {
    pub fn status(&self) -> Status {
        match self {
            ErrorKind::Validation => Status::BadRequest,
            ErrorKind::Authentication => Status::Unauthorized,
            ErrorKind::Authorization => Status::Forbidden,
            ErrorKind::NotFound => Status::NotFound,
            ErrorKind::Conflict => Status::Conflict,
            ErrorKind::Dependency => Status::BadGateway,
            ErrorKind::Internal => Status::InternalServerError,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Authorization => "AUTHORIZATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Dependency => "DEPENDENCY_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn from_status(status: Status) -> Self {
        match status.code {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            502 => ErrorKind::Dependency,
            _ => ErrorKind::Internal,
        }
    }
}

/// -----------------------------
/// API Error
/// -----------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ApiError {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn status(&self) -> Status {
        self.kind.status()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("Invalid {field}"),
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        ApiError::validation(message)
    }
}

/// Serialises the standard error envelope.
pub fn error_body(kind: ErrorKind, message: String) -> String {
    serde_json::to_string(&ApiResponse::<()>::error(kind, message))
        .unwrap_or_else(|_| r#"{"success":false,"message":"Internal error"}"#.to_string())
}

/// -----------------------------
/// Rocket Responder
/// -----------------------------
impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        if self.kind == ErrorKind::Internal {
            log::error!("request failed: {}", self.message);
        }
        let status = self.status();
        let body = error_body(self.kind, self.message);

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
        rating: i32,
    }

    #[test]
    fn kinds_map_to_statuses_and_codes() {
        assert_eq!(ApiError::conflict("x").status(), Status::Conflict);
        assert_eq!(ApiError::forbidden("x").kind.code(), "AUTHORIZATION_ERROR");
        assert_eq!(ErrorKind::from_status(Status::UnprocessableEntity), ErrorKind::Validation);
    }

    #[test]
    fn error_body_carries_code() {
        let body: serde_json::Value =
            serde_json::from_str(&error_body(ErrorKind::NotFound, "Request not found".into()))
                .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "Request not found");
    }

    #[test]
    fn validation_errors_keep_messages() {
        let err: ApiError = Probe { rating: 9 }.validate().unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "Rating must be between 1 and 5");
    }
}
