use std::sync::Arc;

use anyhow::Context;

use stowage_api::app::{self, build_services, default_catalog};
use stowage_infra::InventoryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stowage_observability::init();

    let config = InventoryConfig::from_env().context("invalid inventory configuration")?;
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let services = Arc::new(build_services(config, default_catalog()));
    let workers = services
        .start_workers(tokio::runtime::Handle::current())
        .context("failed to start background workers")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    let served = axum::serve(listener, app::build_app(services))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    tokio::task::spawn_blocking(move || workers.shutdown())
        .await
        .context("worker shutdown panicked")?;
    served.context("server error")
}
