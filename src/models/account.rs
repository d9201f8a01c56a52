use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Address, Coordinates, GeoLocation, Role};

/// Capability shared by the two account collections.
///
/// Users and workers live in separate collections with different shapes; login, token
/// issuance and location resolution only need this common view.
pub trait Account {
    fn account_id(&self) -> ObjectId;
    fn role(&self) -> Role;
    fn display_name(&self) -> &str;
    fn email(&self) -> &str;
    fn password_hash(&self) -> &str;
    fn address(&self) -> &Address;
    fn location(&self) -> &GeoLocation;
    fn profile_photo(&self) -> Option<&str>;
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SignupDto {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub role: Option<Role>,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "Worker type cannot be empty"))]
    pub worker_type: Option<String>,
    #[validate(range(min = 0, max = 80, message = "Experience must be between 0 and 80 years"))]
    pub experience_years: Option<i32>,
    pub state: String,
    pub district: String,
    pub tehsil: String,
    /// Browser-captured position; takes priority over geocoding the address.
    pub location: Option<Coordinates>,
}

impl SignupDto {
    pub fn address(&self) -> Address {
        Address::new(self.state.trim(), self.district.trim(), self.tehsil.trim())
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginDto {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl AccountSummary {
    pub fn of(account: &dyn Account) -> Self {
        AccountSummary {
            id: account.account_id().to_hex(),
            name: account.display_name().to_string(),
            role: account.role(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AccountSummary,
}
