use anyhow::Result;
use tracing::info;

use risk_engine::config::{RiskEngineConfig, SERVICE_NAME};

#[tokio::main]
async fn main() -> Result<()> {
    reliscore_core::init_tracing(SERVICE_NAME)?;

    let cfg = RiskEngineConfig::load()?;
    info!(?cfg, "config loaded");

    risk_engine::run(cfg).await
}
