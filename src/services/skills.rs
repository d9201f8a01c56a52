use mongodb::bson::oid::ObjectId;
use validator::Validate;

use crate::models::{AvailabilityDto, SkillsResponse, UpsertSkillDto, Worker};
use crate::state::AppState;
use crate::utils::ApiError;

/// Skill list and availability of the calling worker. Every change is a single conditional
/// store update, so concurrent edits of different skills never lose each other.
pub struct SkillService;

fn skills_of(worker: Worker) -> SkillsResponse {
    SkillsResponse {
        availability: worker.availability,
        skills: worker.skills,
    }
}

impl SkillService {
    pub async fn list(state: &AppState, worker_id: ObjectId) -> Result<SkillsResponse, ApiError> {
        state
            .store
            .find_worker(worker_id)
            .await?
            .map(skills_of)
            .ok_or_else(|| ApiError::not_found("Worker not found"))
    }

    pub async fn upsert(
        state: &AppState,
        worker_id: ObjectId,
        dto: UpsertSkillDto,
    ) -> Result<SkillsResponse, ApiError> {
        dto.validate()?;
        let skill = dto
            .into_skill()
            .ok_or_else(|| ApiError::validation("Skill name and hourly rate required"))?;

        state
            .store
            .upsert_skill(worker_id, &skill)
            .await?
            .map(skills_of)
            .ok_or_else(|| ApiError::not_found("Worker not found"))
    }

    pub async fn remove(
        state: &AppState,
        worker_id: ObjectId,
        name: &str,
    ) -> Result<SkillsResponse, ApiError> {
        if let Some(worker) = state.store.remove_skill(worker_id, name.trim()).await? {
            return Ok(skills_of(worker));
        }

        match state.store.find_worker(worker_id).await? {
            Some(_) => Err(ApiError::not_found("Skill not found")),
            None => Err(ApiError::not_found("Worker not found")),
        }
    }

    pub async fn set_availability(
        state: &AppState,
        worker_id: ObjectId,
        dto: AvailabilityDto,
    ) -> Result<bool, ApiError> {
        let available = dto
            .availability
            .as_bool()
            .ok_or_else(|| ApiError::validation("Availability must be boolean"))?;

        state
            .store
            .set_availability(worker_id, available)
            .await?
            .map(|worker| worker.availability)
            .ok_or_else(|| ApiError::not_found("Worker not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{KHANNA, TestApp};
    use crate::utils::ErrorKind;
    use serde_json::json;

    fn skill(name: &str, rate: Option<f64>) -> UpsertSkillDto {
        UpsertSkillDto {
            name: name.into(),
            hourly_rate: rate,
        }
    }

    #[tokio::test]
    async fn upsert_then_remove_ignoring_case() {
        let app = TestApp::new();
        let worker = app.worker("Ravi", "electrician", KHANNA).await;

        SkillService::upsert(&app.state, worker.id, skill("Wiring", Some(400.0)))
            .await
            .unwrap();
        let listed = SkillService::upsert(&app.state, worker.id, skill("wiring", Some(450.0)))
            .await
            .unwrap();
        let wiring: Vec<_> = listed.skills.iter().filter(|s| s.name == "Wiring").collect();
        assert_eq!(wiring.len(), 1);
        assert_eq!(wiring[0].hourly_rate, 450.0);

        let after = SkillService::remove(&app.state, worker.id, "WIRING").await.unwrap();
        assert!(after.skills.iter().all(|s| s.name != "Wiring"));

        let err = SkillService::remove(&app.state, worker.id, "Wiring").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "Skill not found");
    }

    #[tokio::test]
    async fn rate_is_required_and_positive() {
        let app = TestApp::new();
        let worker = app.worker("Ravi", "electrician", KHANNA).await;

        for dto in [skill("Wiring", None), skill("Wiring", Some(0.0)), skill("", Some(100.0))] {
            let err = SkillService::upsert(&app.state, worker.id, dto).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn availability_must_be_boolean() {
        let app = TestApp::new();
        let worker = app.worker("Ravi", "electrician", KHANNA).await;

        let err = SkillService::set_availability(
            &app.state,
            worker.id,
            AvailabilityDto { availability: json!("false") },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let now = SkillService::set_availability(
            &app.state,
            worker.id,
            AvailabilityDto { availability: json!(false) },
        )
        .await
        .unwrap();
        assert!(!now);
        assert!(!SkillService::list(&app.state, worker.id).await.unwrap().availability);
    }
}
