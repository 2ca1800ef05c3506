use std::sync::Arc;

use super::run_blocking;
use crate::domain::errors::DomainError;
use crate::domain::ports::SearchIndexRepository;
use crate::domain::search::{EntityType, SearchQuery, SearchResults};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

pub struct SearchService<R: ?Sized> {
    repo: Arc<R>,
}

impl<R: SearchIndexRepository + ?Sized> SearchService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Ranked full-text search plus the unpaginated total. A blank query
    /// matches nothing.
    pub async fn search(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        limit: i64,
        offset: i64,
    ) -> Result<SearchResults, DomainError> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Ok(SearchResults {
                results: Vec::new(),
                total: 0,
            });
        }

        let request = SearchQuery {
            query: query.clone(),
            entity_type,
            limit: limit.clamp(1, MAX_LIMIT),
            offset: offset.max(0),
        };
        let results = run_blocking(&self.repo, move |repo| repo.search(&request)).await?;
        let total =
            run_blocking(&self.repo, move |repo| repo.count_search_results(&query, entity_type))
                .await?;

        Ok(SearchResults { results, total })
    }
}
