use actix_web::{web, HttpResponse};
use serde::Serialize;

use super::AppState;
use crate::application::outbox_publisher::replay_failed_events;
use crate::errors::AppError;

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub replayed: usize,
}

/// POST /outbox/replay
///
/// Makes every outbox row that used up its retries eligible for publishing
/// again.
pub async fn replay(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let replayed = replay_failed_events(&state.outbox).await?;
    Ok(HttpResponse::Ok().json(ReplayResponse { replayed }))
}
