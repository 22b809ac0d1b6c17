//! Huddle API server

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use huddle_api::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let pool =
        huddle_shared::db::create_pool(&config.database_url, config.database_max_connections)
            .await
            .context("connecting to database")?;

    huddle_shared::db::run_migrations(&pool)
        .await
        .context("running migrations")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config).context("building application state")?;

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;

    tracing::info!("Huddle API listening on {bind_address}");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
