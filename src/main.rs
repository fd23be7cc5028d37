use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod common;
mod config;
mod infrastructure;
mod modules;
mod state;
mod workers;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("image_resizer=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    init_tracing();

    info!("Starting image resizer v{}...", env!("CARGO_PKG_VERSION"));

    let config = config::settings::AppConfig::new().context("Error loading configuration")?;
    let state = app::create_app(config).context("Error building pipeline")?;

    workers::resizer::start_resize_worker(state).await?;

    info!("Image resizer stopped");
    Ok(())
}
