use serde::{Deserialize, Serialize};

/// Earth radius used by MongoDB for spherical geometry, in metres.
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Worker => "worker",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub state: String,
    pub district: String,
    pub tehsil: String,
}

impl Address {
    pub fn new(
        state: impl Into<String>,
        district: impl Into<String>,
        tehsil: impl Into<String>,
    ) -> Self {
        Address {
            state: state.into(),
            district: district.into(),
            tehsil: tehsil.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.state.trim().is_empty()
            && !self.district.trim().is_empty()
            && !self.tehsil.trim().is_empty()
    }

    /// Free-text form handed to the geocoder, most specific part first.
    pub fn geocode_query(&self) -> Option<String> {
        if !self.is_complete() {
            return None;
        }
        Some(format!(
            "{}, {}, {}",
            self.tehsil.trim(),
            self.district.trim(),
            self.state.trim()
        ))
    }
}

/// Plain latitude/longitude pair as returned by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// GeoJSON point as stored in the `2dsphere` indexed `location` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(rename = "type")]
    pub geo_type: String, // "Point"
    pub coordinates: [f64; 2], // [longitude, latitude]
}

impl GeoLocation {
    pub fn point(longitude: f64, latitude: f64) -> Self {
        GeoLocation {
            geo_type: String::from("Point"),
            coordinates: [longitude, latitude],
        }
    }

    /// Sentinel stored when no location source produced coordinates.
    pub fn origin() -> Self {
        Self::point(0.0, 0.0)
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }

    pub fn is_origin(&self) -> bool {
        self.coordinates == [0.0, 0.0]
    }

    /// Great-circle distance in metres.
    pub fn distance_to(&self, other: &GeoLocation) -> f64 {
        let (lat1, lat2) = (self.latitude().to_radians(), other.latitude().to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.longitude() - self.longitude()).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

impl From<Coordinates> for GeoLocation {
    fn from(c: Coordinates) -> Self {
        GeoLocation::point(c.longitude, c.latitude)
    }
}
