use log::{error, info};
use rocket::fairing::AdHoc;
use rocket::fs::FileServer;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, BlobBackend};
use crate::db::{DbConn, MongoStore, StoreError};
use crate::models::SearchLimits;
use crate::services::blob::{
    self, BlobError, BlobStore, CloudinaryBlobStore, LocalBlobStore, RetryPolicy,
};
use crate::services::geocoder::{GeocodeError, Geocoder, NominatimGeocoder};
use crate::services::jwt::JwtService;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] rocket::figment::Error),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("geocoder setup failed: {0}")]
    Geocoder(#[from] GeocodeError),

    #[error("blob store setup failed: {0}")]
    Blob(#[from] BlobError),
}

/// Everything a handler needs, managed by Rocket.
#[derive(Clone)]
pub struct AppState {
    pub store: DbConn,
    pub geocoder: Arc<dyn Geocoder>,
    pub blobs: Arc<dyn BlobStore>,
    pub blob_retry: RetryPolicy,
    pub jwt: JwtService,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: DbConn,
        geocoder: Arc<dyn Geocoder>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        AppState {
            store,
            geocoder,
            blobs,
            blob_retry: RetryPolicy::from_config(&config),
            jwt: JwtService::from_config(&config),
            config,
        }
    }

    pub async fn connect(config: AppConfig) -> Result<Self, StartupError> {
        let store = MongoStore::connect(&config.mongodb_uri, &config.database_name).await?;
        let geocoder = NominatimGeocoder::from_config(&config)?;
        let blobs: Arc<dyn BlobStore> = match config.blob_backend {
            BlobBackend::Cloudinary => Arc::new(CloudinaryBlobStore::from_config(&config)?),
            BlobBackend::Local => Arc::new(LocalBlobStore::from_config(&config)),
        };

        Ok(Self::new(config, Arc::new(store), Arc::new(geocoder), blobs))
    }

    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            default_radius: self.config.search_default_radius,
            default_limit: self.config.default_page_limit,
            max_limit: self.config.max_page_limit,
        }
    }

    /// Best-effort removal of blobs whose owning records are already gone.
    pub async fn discard_blobs<I, S>(&self, references: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        blob::delete_blobs(self.blobs.as_ref(), self.blob_retry, references).await;
    }
}

pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("Application state", |rocket| async {
        let config = match AppConfig::from_figment(rocket.figment()) {
            Ok(config) => config,
            Err(e) => {
                error!("✗ Invalid configuration: {}", e);
                return Err(rocket);
            }
        };

        let rocket = if config.blob_backend == BlobBackend::Local {
            if let Err(e) = std::fs::create_dir_all(&config.upload_dir) {
                error!("✗ Cannot create upload directory {}: {}", config.upload_dir, e);
                return Err(rocket);
            }
            rocket.mount(
                config.public_upload_prefix.as_str(),
                FileServer::from(&config.upload_dir),
            )
        } else {
            rocket
        };

        match AppState::connect(config).await {
            Ok(state) => {
                info!("✓ MongoDB connected successfully");
                Ok(rocket.manage(state))
            }
            Err(e) => {
                error!("✗ Failed to start: {}", e);
                Err(rocket)
            }
        }
    })
}
