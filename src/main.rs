mod artifacts;
mod config;
mod document;
mod extract;
mod llm;
mod pipeline;
mod prompt;
mod rasterize;
mod server;
mod spreadsheet;
mod strategy;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use artifacts::ArtifactStore;
use pipeline::Pipeline;
use rasterize::{PageRasterizer, PopplerRasterizer};
use server::AppState;

const CONFIG_ENV: &str = "INVOICE_PILOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "invoice_pilot.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load_or_default(&config_path)?;

    let client = llm::build_client(&cfg.llm)?;

    let rasterizer: Option<Arc<dyn PageRasterizer>> = if cfg.extraction.rasterize {
        PopplerRasterizer::detect(cfg.extraction.render_dpi)
            .map(|r| Arc::new(r) as Arc<dyn PageRasterizer>)
    } else {
        None
    };

    let artifacts = match &cfg.server.output_dir {
        Some(dir) => Some(ArtifactStore::open(dir.clone()).await?),
        None => None,
    };

    info!(
        backend = ?cfg.llm.backend,
        model = %cfg.llm.endpoint().model,
        strategies = ?cfg.extraction.strategies,
        rasterizer = rasterizer.is_some(),
        artifacts = artifacts.is_some(),
        "Starting invoice extraction service"
    );

    let pipeline = Pipeline::new(&cfg, client, rasterizer, artifacts);
    let app = server::router(
        AppState {
            pipeline: Arc::new(pipeline),
        },
        cfg.server.max_body_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
