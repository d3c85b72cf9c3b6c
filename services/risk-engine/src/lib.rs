//! Drive failure-risk model registry and scoring engine.
//!
//! [`store::ArtifactStore`] resolves which version to serve, [`loader`] turns a version
//! directory into a [`loader::LoadedModel`], [`guard::ModelHandle`] publishes it as an
//! atomic snapshot and [`scoring`] scores requests against that snapshot.

pub mod artifact;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod loader;
pub mod metrics;
pub mod predictor;
pub mod scoring;
pub mod service;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

pub use config::RiskEngineConfig;
pub use error::{Result, RiskEngineError};
pub use guard::ModelHandle;
pub use loader::LoadedModel;
pub use scoring::{RiskBucket, ScoreRequest, ScoreResult};
pub use service::RiskService;
pub use store::ArtifactStore;

/// Build the service context from configuration without loading anything yet.
pub fn build_service(cfg: &RiskEngineConfig) -> Result<RiskService> {
    let store = ArtifactStore::open(&cfg.artifacts_root)?.with_bootstrap(cfg.bootstrap_demo);
    let handle = ModelHandle::new(store, cfg.requested_version().map(str::to_string));
    Ok(RiskService::new(Arc::new(handle)))
}

/// Serve until Ctrl-C.
pub async fn run(cfg: RiskEngineConfig) -> anyhow::Result<()> {
    let service = build_service(&cfg)?;

    let warm = service.clone();
    match tokio::task::spawn_blocking(move || warm.get_model_info()).await? {
        Ok(info) => {
            info!(version = %info.model_version, model_type = %info.model_type, features = info.features.len(), "model loaded");
            reliscore_core::mark_ready();
        }
        Err(e) => error!(error = %e, code = e.code(), "initial model load failed; serving without a model"),
    }

    if cfg.refresh_interval_secs > 0 {
        let refresher = service.clone();
        let period = Duration::from_secs(cfg.refresh_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let svc = refresher.clone();
                match tokio::task::spawn_blocking(move || svc.refresh()).await {
                    Ok(Ok(true)) => reliscore_core::mark_ready(),
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => warn!(error = %e, "model refresh failed"),
                    Err(e) => warn!(error = %e, "model refresh task panicked"),
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    info!(addr = %cfg.listen_addr, "listening");
    axum::serve(listener, http::router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown");
        })
        .await?;
    Ok(())
}
