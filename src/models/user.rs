use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Account, Address, GeoLocation, Role};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub profile_photo: Option<String>,
    pub address: Address,
    pub location: GeoLocation,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Account for User {
    fn account_id(&self) -> ObjectId {
        self.id
    }

    fn role(&self) -> Role {
        Role::User
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn password_hash(&self) -> &str {
        &self.password_hash
    }

    fn address(&self) -> &Address {
        &self.address
    }

    fn location(&self) -> &GeoLocation {
        &self.location
    }

    fn profile_photo(&self) -> Option<&str> {
        self.profile_photo.as_deref()
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserProfileDto {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    /// Blob reference returned by the upload endpoint.
    pub profile_photo: Option<String>,
}

/// Field changes applied to an account document in one update.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub profile_photo: Option<String>,
    pub worker_type: Option<String>,
    pub experience_years: Option<i32>,
    pub location: Option<GeoLocation>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.profile_photo.is_none()
            && self.worker_type.is_none()
            && self.experience_years.is_none()
            && self.location.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub profile_photo: Option<String>,
    pub address: Address,
    pub location: GeoLocation,
    pub created_at: ChronoDateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.to_hex(),
            role: Role::User,
            name: user.name,
            email: user.email,
            phone: user.phone,
            profile_photo: user.profile_photo,
            address: user.address,
            location: user.location,
            created_at: user.created_at.to_chrono(),
        }
    }
}
