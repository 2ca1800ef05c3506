use dotenvy::dotenv;
use event_pipeline::{build_server, create_pool, run_migrations, Settings};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = Settings::from_env().expect("invalid configuration");

    let pool = create_pool(&settings.database_url).expect("Failed to create DB pool");
    run_migrations(&pool).expect("Failed to run database migrations");

    log::info!("Starting server at http://{}:{}", settings.host, settings.port);

    build_server(pool, &settings.host, settings.port)?.await
}
