use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

pub const SERVICE_NAME: &str = "risk-engine";
/// Sentinel that asks for auto-resolution instead of a pinned version.
pub const LATEST: &str = "latest";

#[derive(Debug, Clone, Deserialize)]
pub struct RiskEngineConfig {
    pub artifacts_root: PathBuf,
    #[serde(default)]
    pub model_version: Option<String>,
    pub bootstrap_demo: bool,
    pub listen_addr: String,
    pub refresh_interval_secs: u64,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from("./artifacts"),
            model_version: None,
            bootstrap_demo: true,
            listen_addr: "0.0.0.0:8000".into(),
            refresh_interval_secs: 0,
        }
    }
}

impl RiskEngineConfig {
    /// Defaults, then config file / `RELISCORE__*` env, then the legacy
    /// `MODEL_ARTIFACTS_ROOT` / `MODEL_VERSION` variables on top.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let mut builder = reliscore_core::config_builder(SERVICE_NAME)?
            .set_default("artifacts_root", defaults.artifacts_root.to_string_lossy().into_owned())?
            .set_default("bootstrap_demo", defaults.bootstrap_demo)?
            .set_default("listen_addr", defaults.listen_addr.clone())?
            .set_default("refresh_interval_secs", defaults.refresh_interval_secs as i64)?;
        if let Ok(root) = std::env::var("MODEL_ARTIFACTS_ROOT") {
            builder = builder.set_override("artifacts_root", root)?;
        }
        if let Ok(version) = std::env::var("MODEL_VERSION") {
            builder = builder.set_override("model_version", version)?;
        }
        let cfg: Self = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }

    /// The explicit version pin, if any; blank and `latest` both mean auto-resolve.
    pub fn requested_version(&self) -> Option<&str> {
        self.model_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != LATEST)
    }
}
