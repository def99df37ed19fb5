use anyhow::Result;
use tracing::info;

use person_registry::{api, config, db};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("person_registry=info".parse()?)
        )
        .init();

    info!("Starting person registry v{}", env!("CARGO_PKG_VERSION"));

    let cfg = config::load()?;
    info!("Configuration loaded");

    let store = db::DbBackend::from_config(&cfg.database);
    info!("Document store: database={}", store.database_name());

    api::serve(cfg, store).await
}
