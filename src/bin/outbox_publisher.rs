//! Polls the outbox table and publishes staged events to Kafka.

use std::sync::Arc;

use dotenvy::dotenv;
use event_pipeline::application::outbox_publisher::OutboxPublisher;
use event_pipeline::bus::{KafkaTransport, MessageBus, SchemaRegistry};
use event_pipeline::infrastructure::outbox_repo::DieselOutboxRepository;
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
    let repo = Arc::new(
        DieselOutboxRepository::new(pool).with_default_max_retries(settings.outbox_max_retries),
    );
    let publisher = OutboxPublisher::new(repo, bus.clone(), settings.publisher_config());

    publisher.start_polling(shutdown_on_ctrl_c()).await;
    bus.disconnect().await?;
    Ok(())
}
