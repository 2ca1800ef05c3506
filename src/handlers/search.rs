use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::AppState;
use crate::application::search_service::DEFAULT_LIMIT;
use crate::domain::search::EntityType;
use crate::errors::AppError;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    /// `post`, `user` or `comment`; absent searches every type.
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /search?q=&type=&limit=&offset=
///
/// Ranked full-text search over the index. `total` counts every match,
/// ignoring `limit` and `offset`.
pub async fn search(
    state: web::Data<AppState>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, AppError> {
    let params = params.into_inner();
    let entity_type = params
        .entity_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::parse::<EntityType>)
        .transpose()?;

    let results = state
        .search
        .search(
            &params.q,
            entity_type,
            params.limit.unwrap_or(DEFAULT_LIMIT),
            params.offset.unwrap_or(0),
        )
        .await?;

    Ok(HttpResponse::Ok().json(results))
}
