//! locatord: service locator daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;

use locator_core::config::LocatorConfig;
use locator_services::{AdhocGateway, Gateway};

use locatord::actor::{attach_bootstrap, detach_all};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = LocatorConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = LocatorConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        let mut config = LocatorConfig::default();
        config.resolve_identity();
        config
    });

    let gateway: Option<Arc<dyn Gateway>> = if config.discovery.gateway {
        Some(Arc::new(AdhocGateway::new()))
    } else {
        tracing::info!("no gateway configured, remote services will not be resolved");
        None
    };

    let locator = locatord::start(&config, gateway)
        .await
        .context("failed to start locator")?;

    // Bootstrap services are attached off the runtime threads
    let attached = {
        let registry = locator.registry();
        let services = config.services.clone();
        let runtime = Handle::current();
        tokio::task::spawn_blocking(move || attach_bootstrap(&registry, &services, runtime))
            .await
            .context("bootstrap attach task failed")?
    };

    // Diagnostics API
    if config.api.enabled() {
        let state = locator_api::ApiState {
            registry: locator.registry(),
            status: locator.status(),
            local: locator.local_key().clone(),
        };
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = locator_api::serve(state, port).await {
                tracing::error!(error = %e, "diagnostics api failed");
            }
        });
    } else {
        tracing::info!("diagnostics api disabled");
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");

    {
        let registry = locator.registry();
        tokio::task::spawn_blocking(move || detach_all(&registry, &attached))
            .await
            .context("bootstrap detach task failed")?;
    }

    locator.shutdown().await;
    Ok(())
}
