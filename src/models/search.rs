//! Worker search criteria.
//!
//! `SearchWorkersDto` is the loosely typed request body. It is normalised once into a
//! `WorkerQuery`, which every store implementation evaluates: MongoDB translates it into a
//! single filter document (wrapped in `$geoNear` when a location is given), the in-memory
//! store evaluates `WorkerQuery::matches` directly.

use serde::{Deserialize, Serialize};

use super::{GeoLocation, Worker, WorkerSummary};
use crate::utils::ApiError;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Default, Deserialize)]
pub struct RangeDto {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationFilterDto {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Metres.
    pub radius: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddressFilterDto {
    pub state: Option<String>,
    pub district: Option<String>,
    pub tehsil: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationDto {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    RatingAsc,
    RatingDesc,
    FeesAsc,
    FeesDesc,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchWorkersDto {
    #[serde(rename = "type")]
    pub worker_type: Option<String>,
    pub skills: Vec<String>,
    pub rating: Option<RangeDto>,
    pub fees: Option<RangeDto>,
    pub location: Option<LocationFilterDto>,
    pub address: Option<AddressFilterDto>,
    pub sort: Option<SortOrder>,
    pub pagination: Option<PaginationDto>,
}

/// 1-indexed page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64, max_limit: u64) -> Self {
        Page {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit.max(1)),
        }
    }

    /// Saturates instead of overflowing; capped so it always fits a BSON `i64`.
    pub fn skip(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.limit)
            .min(i64::MAX as u64)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRange {
    pub min: f64,
    pub max: Option<f64>,
}

impl FeeRange {
    /// Each bound is checked on its own: some rate reaches `min` and some rate, not
    /// necessarily the same one, stays within `max`.
    pub fn admits(&self, rates: &[f64]) -> bool {
        rates.iter().any(|rate| *rate >= self.min)
            && self.max.is_none_or(|max| rates.iter().any(|rate| *rate <= max))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressFilter {
    pub state: Option<String>,
    pub district: Option<String>,
    pub tehsil: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proximity {
    pub center: GeoLocation,
    pub radius_meters: f64,
}

/// Normalised search criteria; every field is AND-combined.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerQuery {
    pub worker_type: Option<String>,
    pub skills: Vec<String>,
    pub rating_min: f64,
    pub rating_max: f64,
    pub fees: Option<FeeRange>,
    pub address: AddressFilter,
    pub near: Option<Proximity>,
    pub sort: Option<SortOrder>,
    pub page: Page,
}

/// Limits applied while normalising a search.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub default_radius: f64,
    pub default_limit: u64,
    pub max_limit: u64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl WorkerQuery {
    pub fn from_dto(dto: SearchWorkersDto, limits: SearchLimits) -> Result<Self, ApiError> {
        let rating = dto.rating.unwrap_or_default();
        let rating_min = rating.min.unwrap_or(MIN_RATING);
        let rating_max = rating.max.unwrap_or(MAX_RATING);
        if !(rating_min.is_finite() && rating_max.is_finite()) || rating_min > rating_max {
            return Err(ApiError::validation("Invalid rating range"));
        }

        let fees = match dto.fees {
            Some(RangeDto { min: None, max: None }) | None => None,
            Some(range) => {
                let fees = FeeRange {
                    min: range.min.unwrap_or(0.0),
                    max: range.max,
                };
                if fees.min < 0.0 || fees.max.is_some_and(|max| max < fees.min) {
                    return Err(ApiError::validation("Invalid fee range"));
                }
                Some(fees)
            }
        };

        let near = match dto.location {
            Some(LocationFilterDto {
                lat: Some(lat),
                lng: Some(lng),
                radius,
            }) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err(ApiError::validation("Invalid latitude or longitude"));
                }
                let radius_meters = radius.unwrap_or(limits.default_radius);
                if !radius_meters.is_finite() || radius_meters <= 0.0 {
                    return Err(ApiError::validation("Radius must be a positive number of metres"));
                }
                Some(Proximity {
                    center: GeoLocation::point(lng, lat),
                    radius_meters,
                })
            }
            _ => None,
        };

        let address = dto
            .address
            .map(|a| AddressFilter {
                state: non_blank(a.state),
                district: non_blank(a.district),
                tehsil: non_blank(a.tehsil),
            })
            .unwrap_or_default();

        let pagination = dto.pagination.unwrap_or_default();

        Ok(WorkerQuery {
            worker_type: non_blank(dto.worker_type),
            skills: dto
                .skills
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            rating_min,
            rating_max,
            fees,
            address,
            near,
            sort: dto.sort,
            page: Page::new(
                pagination.page,
                pagination.limit,
                limits.default_limit,
                limits.max_limit,
            ),
        })
    }

    /// Every predicate except proximity, which the store evaluates alongside.
    pub fn matches(&self, worker: &Worker) -> bool {
        if !worker.availability {
            return false;
        }
        if self
            .worker_type
            .as_ref()
            .is_some_and(|t| &worker.worker_type != t)
        {
            return false;
        }
        if !self.skills.is_empty()
            && !worker
                .skills
                .iter()
                .any(|skill| self.skills.contains(&skill.name))
        {
            return false;
        }
        if worker.rating_avg < self.rating_min || worker.rating_avg > self.rating_max {
            return false;
        }
        if let Some(fees) = &self.fees {
            let rates: Vec<f64> = worker.skills.iter().map(|s| s.hourly_rate).collect();
            if !fees.admits(&rates) {
                return false;
            }
        }

        let address = &self.address;
        address.state.as_ref().is_none_or(|s| &worker.address.state == s)
            && address.district.as_ref().is_none_or(|d| &worker.address.district == d)
            && address.tehsil.as_ref().is_none_or(|t| &worker.address.tehsil == t)
    }
}

/// A matched worker and, for proximity searches, its distance in metres.
#[derive(Debug, Clone)]
pub struct WorkerHit {
    pub worker: Worker,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SearchPage {
    pub hits: Vec<WorkerHit>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub results: Vec<WorkerSummary>,
}

impl SearchResponse {
    pub fn new(page: Page, result: SearchPage) -> Self {
        SearchResponse {
            page: page.page,
            limit: page.limit,
            total: result.total,
            total_pages: page.total_pages(result.total),
            results: result
                .hits
                .into_iter()
                .map(|hit| WorkerSummary::with_distance(hit.worker, hit.distance))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, Skill};
    use mongodb::bson::{DateTime, oid::ObjectId};

    const LIMITS: SearchLimits = SearchLimits {
        default_radius: 5000.0,
        default_limit: 10,
        max_limit: 100,
    };

    fn worker(rating: f64, rates: &[f64]) -> Worker {
        let now = DateTime::now();
        Worker {
            id: ObjectId::new(),
            name: "w".into(),
            email: "w@example.com".into(),
            password_hash: String::new(),
            phone: None,
            profile_photo: None,
            worker_type: "plumbing".into(),
            experience_years: 1,
            solved_count: 0,
            availability: true,
            rating_avg: rating,
            reviews_count: 0,
            skills: rates
                .iter()
                .enumerate()
                .map(|(i, r)| Skill { name: format!("skill-{i}"), hourly_rate: *r })
                .collect(),
            address: Address::new("Punjab", "Ludhiana", "Khanna"),
            location: GeoLocation::origin(),
            created_at: now,
            updated_at: now,
        }
    }

    fn query(json: serde_json::Value) -> WorkerQuery {
        let dto: SearchWorkersDto = serde_json::from_value(json).expect("dto");
        WorkerQuery::from_dto(dto, LIMITS).expect("query")
    }

    #[test]
    fn empty_body_uses_defaults() {
        let q = query(serde_json::json!({}));
        assert_eq!((q.rating_min, q.rating_max), (0.0, 5.0));
        assert_eq!(q.fees, None);
        assert_eq!(q.near, None);
        assert_eq!(q.page, Page { page: 1, limit: 10 });
    }

    #[test]
    fn location_needs_both_coordinates() {
        let q = query(serde_json::json!({ "location": { "lat": 30.9 } }));
        assert!(q.near.is_none());

        let q = query(serde_json::json!({ "location": { "lat": 30.9, "lng": 75.8 } }));
        let near = q.near.expect("near");
        assert_eq!(near.radius_meters, 5000.0);
        assert_eq!(near.center.coordinates, [75.8, 30.9]);
    }

    #[test]
    fn rejects_inverted_ranges() {
        let dto: SearchWorkersDto =
            serde_json::from_value(serde_json::json!({ "rating": { "min": 4, "max": 2 } })).unwrap();
        assert!(WorkerQuery::from_dto(dto, LIMITS).is_err());

        let dto: SearchWorkersDto =
            serde_json::from_value(serde_json::json!({ "fees": { "min": 900, "max": 100 } })).unwrap();
        assert!(WorkerQuery::from_dto(dto, LIMITS).is_err());
    }

    #[test]
    fn sort_names_are_camel_case() {
        let q = query(serde_json::json!({ "sort": "feesDesc" }));
        assert_eq!(q.sort, Some(SortOrder::FeesDesc));
    }

    #[test]
    fn rating_minimum_is_inclusive() {
        let q = query(serde_json::json!({ "rating": { "min": 3 } }));
        assert!(q.matches(&worker(3.0, &[])));
        assert!(q.matches(&worker(4.5, &[])));
        assert!(!q.matches(&worker(2.9, &[])));
    }

    #[test]
    fn fee_maximum_needs_any_skill_in_range() {
        let q = query(serde_json::json!({ "fees": { "max": 800 } }));
        assert!(q.matches(&worker(0.0, &[1200.0, 800.0])));
        assert!(!q.matches(&worker(0.0, &[1200.0, 900.0])));
        assert!(!q.matches(&worker(0.0, &[])));
    }

    #[test]
    fn fee_bounds_may_be_met_by_different_skills() {
        let q = query(serde_json::json!({ "fees": { "min": 200, "max": 500 } }));
        assert!(q.matches(&worker(0.0, &[100.0, 1000.0])));
        assert!(q.matches(&worker(0.0, &[300.0])));
        assert!(!q.matches(&worker(0.0, &[1000.0, 2000.0])));
        assert!(!q.matches(&worker(0.0, &[50.0, 150.0])));
    }

    #[test]
    fn unavailable_workers_never_match() {
        let mut w = worker(5.0, &[100.0]);
        w.availability = false;
        assert!(!query(serde_json::json!({})).matches(&w));
    }

    #[test]
    fn address_parts_filter_independently() {
        let w = worker(1.0, &[]);
        assert!(query(serde_json::json!({ "address": { "district": "Ludhiana" } })).matches(&w));
        assert!(!query(serde_json::json!({ "address": { "tehsil": "Samrala" } })).matches(&w));
    }

    #[test]
    fn skills_match_any_listed_name() {
        let w = worker(1.0, &[100.0, 200.0]);
        assert!(query(serde_json::json!({ "skills": ["nope", "skill-1"] })).matches(&w));
        assert!(!query(serde_json::json!({ "skills": ["nope"] })).matches(&w));
    }

    #[test]
    fn page_math() {
        let page = Page::new(Some(2), Some(10), 10, 100);
        assert_eq!(page.skip(), 10);
        assert_eq!(page.total_pages(25), 3);
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(Page::new(Some(0), Some(1000), 10, 100), Page { page: 1, limit: 100 });
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let q = query(serde_json::json!({ "pagination": { "page": u64::MAX, "limit": 10 } }));
        assert_eq!(q.page.page, u64::MAX);
        assert_eq!(q.page.skip(), i64::MAX as u64);
        assert_eq!(q.page.total_pages(25), 3);
    }
}
