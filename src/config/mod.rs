use rocket::Config as RocketConfig;
use rocket::figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    Local,
    Cloudinary,
}

/// Application settings, extracted once from the Rocket figment at ignition.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mongodb_uri: String,
    pub database_name: String,

    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiry: i64,
    pub bcrypt_cost: u32,

    pub geocoder_url: String,
    pub geocoder_user_agent: String,

    pub blob_backend: BlobBackend,
    pub upload_dir: String,
    pub public_upload_prefix: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_api_key: Option<String>,
    pub cloudinary_api_secret: Option<String>,
    pub cloudinary_folder: String,
    pub blob_retry_attempts: u32,
    pub blob_retry_base_ms: u64,
    pub max_upload_bytes: u64,

    /// Metres.
    pub search_default_radius: f64,
    /// Metres.
    pub dashboard_radius: f64,
    pub default_page_limit: u64,
    pub max_page_limit: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            mongodb_uri: "mongodb://localhost:27017/fixitnow".to_string(),
            database_name: "fixitnow".to_string(),
            jwt_secret: "default-secret".to_string(),
            jwt_expiry: 30 * 24 * 60 * 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            geocoder_url: "https://nominatim.openstreetmap.org/search".to_string(),
            geocoder_user_agent: "fixitnow-server".to_string(),
            blob_backend: BlobBackend::Local,
            upload_dir: "uploads".to_string(),
            public_upload_prefix: "/uploads".to_string(),
            cloudinary_cloud_name: None,
            cloudinary_api_key: None,
            cloudinary_api_secret: None,
            cloudinary_folder: "fixitnow_uploads".to_string(),
            blob_retry_attempts: 3,
            blob_retry_base_ms: 200,
            max_upload_bytes: 5 * 1024 * 1024,
            search_default_radius: 5000.0,
            dashboard_radius: 5000.0,
            default_page_limit: 10,
            max_page_limit: 100,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        figment.extract()
    }
}

pub fn figment() -> Figment {
    let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

    Figment::from(RocketConfig::default())
        .merge(Toml::file("Rocket.toml").nested())
        .select(&profile)
        .merge(Env::prefixed("ROCKET_").ignore(&["PROFILE"]).global())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::figment::providers::Serialized;

    #[test]
    fn defaults_fill_missing_keys() {
        let figment = Figment::from(Serialized::defaults(serde_json::json!({
            "jwt_secret": "s3cret",
            "blob_backend": "cloudinary",
        })));
        let config = AppConfig::from_figment(&figment).expect("config");

        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.jwt_expiry, 2_592_000);
        assert_eq!(config.search_default_radius, 5000.0);
        assert_eq!(config.blob_backend, BlobBackend::Cloudinary);
        assert_eq!(config.cloudinary_api_key, None);
    }
}
