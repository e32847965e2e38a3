use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use mech_dispatch::config::Config;
use mech_dispatch::kernel::Kernel;
use mech_dispatch::{api, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    telemetry::init(&config.log_level);

    tracing::info!("starting mech-dispatch");

    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.db_uri)
        .await
        .context("failed to connect to database")?;
    tracing::info!("database connected");

    let kernel = std::sync::Arc::new(Kernel::new(&config, Some(pool)));
    kernel.spawn_background_tasks();

    let app = api::router(kernel, &config);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind to address")?;

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
