use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Account, Address, GeoLocation, Role};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Skill {
    pub name: String,
    pub hourly_rate: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Worker {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub profile_photo: Option<String>,
    pub worker_type: String,
    pub experience_years: i32,
    pub solved_count: i32,
    pub availability: bool,
    pub rating_avg: f64,
    pub reviews_count: i32,
    pub skills: Vec<Skill>,
    pub address: Address,
    pub location: GeoLocation,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Skill names are unique per worker, compared without case.
pub fn same_skill_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl Worker {
    pub fn lowest_rate(&self) -> Option<f64> {
        self.skills.iter().map(|s| s.hourly_rate).reduce(f64::min)
    }

    pub fn highest_rate(&self) -> Option<f64> {
        self.skills.iter().map(|s| s.hourly_rate).reduce(f64::max)
    }

    /// Adds the skill, or updates the rate when a skill with the same name (ignoring case)
    /// already exists. The stored name keeps its original casing.
    pub fn upsert_skill(&mut self, skill: Skill) {
        match self
            .skills
            .iter_mut()
            .find(|s| same_skill_name(&s.name, &skill.name))
        {
            Some(existing) => existing.hourly_rate = skill.hourly_rate,
            None => self.skills.push(skill),
        }
    }

    pub fn remove_skill(&mut self, name: &str) -> bool {
        match self
            .skills
            .iter()
            .position(|s| same_skill_name(&s.name, name))
        {
            Some(index) => {
                self.skills.remove(index);
                true
            }
            None => false,
        }
    }
}

impl Account for Worker {
    fn account_id(&self) -> ObjectId {
        self.id
    }

    fn role(&self) -> Role {
        Role::Worker
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
#[serde(default)]
pub struct UpsertSkillDto {
    #[validate(length(min = 1, message = "Skill name and hourly rate required"))]
    pub name: String,
    pub hourly_rate: Option<f64>,
}

impl UpsertSkillDto {
    pub fn into_skill(self) -> Option<Skill> {
        let name = self.name.trim().to_string();
        match self.hourly_rate {
            Some(rate) if !name.is_empty() && rate.is_finite() && rate > 0.0 => Some(Skill {
                name,
                hourly_rate: rate,
            }),
            _ => None,
        }
    }
}

/// Kept loosely typed so a non-boolean value yields a validation error, not a parse error.
#[derive(Debug, Deserialize)]
pub struct AvailabilityDto {
    #[serde(default)]
    pub availability: serde_json::Value,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateWorkerProfileDto {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "Worker type cannot be empty"))]
    pub worker_type: Option<String>,
    #[validate(range(min = 0, max = 80, message = "Experience must be between 0 and 80 years"))]
    pub experience_years: Option<i32>,
    pub profile_photo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationDto {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct SkillsResponse {
    pub availability: bool,
    pub skills: Vec<Skill>,
}

/// The worker's own view of their profile.
#[derive(Debug, Serialize)]
pub struct WorkerResponse {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub profile_photo: Option<String>,
    pub worker_type: String,
    pub experience_years: i32,
    pub solved_count: i32,
    pub availability: bool,
    pub rating_avg: f64,
    pub reviews_count: i32,
    pub skills: Vec<Skill>,
    pub address: Address,
    pub location: GeoLocation,
    pub created_at: ChronoDateTime<Utc>,
}

impl From<Worker> for WorkerResponse {
    fn from(worker: Worker) -> Self {
        WorkerResponse {
            id: worker.id.to_hex(),
            role: Role::Worker,
            name: worker.name,
            email: worker.email,
            phone: worker.phone,
            profile_photo: worker.profile_photo,
            worker_type: worker.worker_type,
            experience_years: worker.experience_years,
            solved_count: worker.solved_count,
            availability: worker.availability,
            rating_avg: worker.rating_avg,
            reviews_count: worker.reviews_count,
            skills: worker.skills,
            address: worker.address,
            location: worker.location,
            created_at: worker.created_at.to_chrono(),
        }
    }
}

/// Public projection returned by search and profile lookups. No credentials, no contact data.
#[derive(Debug, Serialize, Clone)]
pub struct WorkerSummary {
    pub id: String,
    pub name: String,
    pub worker_type: String,
    pub skills: Vec<Skill>,
    pub rating_avg: f64,
    pub reviews_count: i32,
    pub experience_years: i32,
    pub profile_photo: Option<String>,
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl WorkerSummary {
    pub fn with_distance(worker: Worker, distance: Option<f64>) -> Self {
        WorkerSummary {
            id: worker.id.to_hex(),
            name: worker.name,
            worker_type: worker.worker_type,
            skills: worker.skills,
            rating_avg: worker.rating_avg,
            reviews_count: worker.reviews_count,
            experience_years: worker.experience_years,
            profile_photo: worker.profile_photo,
            address: worker.address,
            distance,
        }
    }
}

impl From<Worker> for WorkerSummary {
    fn from(worker: Worker) -> Self {
        WorkerSummary::with_distance(worker, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker_with(skills: &[(&str, f64)]) -> Worker {
        let now = DateTime::now();
        Worker {
            id: ObjectId::new(),
            name: "Ravi".into(),
            email: "ravi@example.com".into(),
            password_hash: "x".into(),
            phone: None,
            profile_photo: None,
            worker_type: "plumbing".into(),
            experience_years: 3,
            solved_count: 0,
            availability: true,
            rating_avg: 0.0,
            reviews_count: 0,
            skills: skills
                .iter()
                .map(|(n, r)| Skill { name: n.to_string(), hourly_rate: *r })
                .collect(),
            address: Address::default(),
            location: GeoLocation::origin(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn upsert_matches_names_ignoring_case() {
        let mut worker = worker_with(&[("Pipe Fitting", 300.0)]);
        worker.upsert_skill(Skill { name: "pipe fitting".into(), hourly_rate: 450.0 });
        worker.upsert_skill(Skill { name: "Drain Cleaning".into(), hourly_rate: 200.0 });

        assert_eq!(worker.skills.len(), 2);
        assert_eq!(worker.skills[0].name, "Pipe Fitting");
        assert_eq!(worker.skills[0].hourly_rate, 450.0);
        assert_eq!(worker.skills[1].hourly_rate, 200.0);
    }

    #[test]
    fn remove_reports_missing_skill() {
        let mut worker = worker_with(&[("Wiring", 500.0)]);
        assert!(!worker.remove_skill("tiling"));
        assert!(worker.remove_skill("WIRING"));
        assert!(worker.skills.is_empty());
    }

    #[test]
    fn rate_extremes() {
        let worker = worker_with(&[("a", 300.0), ("b", 900.0), ("c", 150.0)]);
        assert_eq!(worker.lowest_rate(), Some(150.0));
        assert_eq!(worker.highest_rate(), Some(900.0));
        assert_eq!(worker_with(&[]).lowest_rate(), None);
    }

    #[test]
    fn skill_dto_rejects_missing_rate() {
        let dto = UpsertSkillDto { name: "Wiring".into(), hourly_rate: None };
        assert!(dto.into_skill().is_none());

        let dto = UpsertSkillDto { name: " Wiring ".into(), hourly_rate: Some(250.0) };
        assert_eq!(dto.into_skill().map(|s| s.name), Some("Wiring".to_string()));
    }
}
