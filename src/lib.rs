pub mod application;
pub mod bus;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio_util::sync::CancellationToken;

pub use config::{ConfigError, Settings};
pub use db::{create_pool, DbPool};

use handlers::AppState;
use infrastructure::outbox_repo::DieselOutboxRepository;
use infrastructure::search_repo::DieselSearchIndexRepository;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type MigrationError = Box<dyn std::error::Error + Send + Sync>;

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), MigrationError> {
    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    if !applied.is_empty() {
        log::info!("Applied {} database migrations", applied.len());
    }
    Ok(())
}

/// Build and return an actix-web `Server` bound to `host:port` serving the
/// search and outbox admin endpoints.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    pool: DbPool,
    host: &str,
    port: u16,
) -> std::io::Result<actix_web::dev::Server> {
    let state = web::Data::new(AppState::new(
        Arc::new(DieselSearchIndexRepository::new(pool.clone())),
        Arc::new(DieselOutboxRepository::new(pool)),
    ));

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind((host.to_string(), port))?
    .run())
}

/// A token cancelled on the first Ctrl-C, for the worker binaries.
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Shutdown requested"),
            Err(e) => log::error!("Cannot listen for Ctrl-C, shutting down: {}", e),
        }
        trigger.cancel();
    });
    token
}
