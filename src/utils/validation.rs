use mongodb::bson::oid::ObjectId;
use regex::Regex;
use std::sync::LazyLock;

use super::ApiError;
use crate::models::Coordinates;

static MOBILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+91[\s-]?)?[6-9]\d{9}$").expect("valid mobile regex"));

pub fn validate_mobile(mobile: &str) -> bool {
    MOBILE_RE.is_match(mobile.trim())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Anchored, case-insensitive MongoDB pattern matching exactly `name`.
pub fn exact_name_pattern(name: &str) -> String {
    format!("^{}$", regex::escape(name))
}

pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw).map_err(|_| ApiError::validation(format!("Invalid {what} ID")))
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Coordinates, ApiError> {
    let coordinates = Coordinates {
        latitude,
        longitude,
    };
    if !coordinates.is_valid() {
        return Err(ApiError::validation("Invalid latitude or longitude"));
    }
    Ok(coordinates)
}
