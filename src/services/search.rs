use log::debug;

use crate::models::{SearchResponse, SearchWorkersDto, WorkerQuery};
use crate::state::AppState;
use crate::utils::ApiError;

pub struct SearchService;

impl SearchService {
    pub async fn search(state: &AppState, dto: SearchWorkersDto) -> Result<SearchResponse, ApiError> {
        let query = WorkerQuery::from_dto(dto, state.search_limits())?;
        debug!("Worker search: {:?}", query);

        let page = state.store.search_workers(&query).await?;
        Ok(SearchResponse::new(query.page, page))
    }
}
