//! Address to coordinates lookup.
//!
//! Geocoding is advisory: every caller goes through `resolve_location`, which falls back to
//! the `[0, 0]` sentinel and logs instead of failing the operation.

use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::{Address, Coordinates, GeoLocation};

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unparseable coordinate '{0}' in geocoder response")]
    Parse(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Candidate coordinates for a free-text address, best match first.
    async fn geocode(&self, query: &str) -> Result<Vec<Coordinates>, GeocodeError>;
}

/// OpenStreetMap Nominatim search API.
pub struct NominatimGeocoder {
    client: Client,
    url: String,
}

#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

fn parse_degrees(raw: &str) -> Result<f64, GeocodeError> {
    raw.parse().map_err(|_| GeocodeError::Parse(raw.to_string()))
}

impl NominatimGeocoder {
    pub fn new(url: impl Into<String>, user_agent: &str) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(NominatimGeocoder {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GeocodeError> {
        Self::new(config.geocoder_url.clone(), &config.geocoder_user_agent)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<Coordinates>, GeocodeError> {
        let places: Vec<Place> = self
            .client
            .get(&self.url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        places
            .iter()
            .map(|place| {
                Ok(Coordinates {
                    latitude: parse_degrees(&place.lat)?,
                    longitude: parse_degrees(&place.lon)?,
                })
            })
            .collect()
    }
}

/// First valid geocoding result for `address`, or the origin sentinel.
pub async fn resolve_location(geocoder: &dyn Geocoder, address: &Address) -> GeoLocation {
    let Some(query) = address.geocode_query() else {
        return GeoLocation::origin();
    };

    match geocoder.geocode(&query).await {
        Ok(results) => match results.into_iter().find(Coordinates::is_valid) {
            Some(coordinates) => coordinates.into(),
            None => {
                warn!("No geocoding result for '{}'", query);
                GeoLocation::origin()
            }
        },
        Err(e) => {
            warn!("Geocoding '{}' failed: {}", query, e);
            GeoLocation::origin()
        }
    }
}
