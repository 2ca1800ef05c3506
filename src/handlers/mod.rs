pub mod outbox;
pub mod search;

use std::sync::Arc;

use actix_web::web;

use crate::application::search_service::SearchService;
use crate::domain::ports::{OutboxRepository, SearchIndexRepository};

/// Shared by every worker of the HTTP server.
pub struct AppState {
    pub search: SearchService<dyn SearchIndexRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
}

impl AppState {
    pub fn new(search: Arc<dyn SearchIndexRepository>, outbox: Arc<dyn OutboxRepository>) -> Self {
        Self {
            search: SearchService::new(search),
            outbox,
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/search", web::get().to(search::search))
        .route("/outbox/replay", web::post().to(outbox::replay));
}
