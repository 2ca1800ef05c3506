//! Logs every dead letter on the domain DLQ topics.

use dotenvy::dotenv;
use event_pipeline::application::dead_letter::run_dlq_processor;
use event_pipeline::bus::{KafkaTransport, MessageBus, SchemaRegistry};
use event_pipeline::{shutdown_on_ctrl_c, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env()?;
    let bus = MessageBus::new(
        KafkaTransport::connect(settings.kafka.clone())?,
        SchemaRegistry::with_domain_schemas(),
    );

    run_dlq_processor(&bus, &settings.dlq_consumer_group, shutdown_on_ctrl_c()).await?;
    bus.disconnect().await?;
    Ok(())
}
