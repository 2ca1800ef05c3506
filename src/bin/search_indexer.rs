//! Keeps the full-text index in step with the domain topics.

use std::sync::Arc;

use dotenvy::dotenv;
use event_pipeline::application::search_indexer::run_search_indexer;
use event_pipeline::bus::{KafkaTransport, MessageBus, SchemaRegistry};
use event_pipeline::infrastructure::search_repo::DieselSearchIndexRepository;
use event_pipeline::{create_pool, run_migrations, shutdown_on_ctrl_c, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env()?;
    let pool = create_pool(&settings.database_url)?;
    run_migrations(&pool)?;

    let bus = MessageBus::new(
        KafkaTransport::connect(settings.kafka.clone())?,
        SchemaRegistry::with_domain_schemas(),
    );
    let repo = Arc::new(DieselSearchIndexRepository::new(pool));

    run_search_indexer(
        &bus,
        repo,
        &settings.search_consumer_group,
        shutdown_on_ctrl_c(),
    )
    .await?;
    bus.disconnect().await?;
    Ok(())
}
