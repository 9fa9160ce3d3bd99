//! Example server: reads settings from the environment, loads entity config from CONFIG_PATH,
//! ensures the database exists, and serves common and entity routes.

use crud_scaffold::{app, ensure_database_exists, load_from_path, resolve, AppState, Settings};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crud_scaffold=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;

    let config = load_from_path(&settings.config_path)?;
    let model = resolve(&config, &settings.search)?;
    tracing::info!(entities = model.entities.len(), config = %settings.config_path.display(), "model resolved");

    let listener = TcpListener::bind(&settings.listen_addr).await?;
    let state = AppState::new(pool, model, settings);
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
