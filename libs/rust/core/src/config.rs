//! Layered configuration shared by all services.
//!
//! Precedence (lowest first): defaults set by the caller, the optional file named by
//! `RELISCORE_CONFIG_FILE`, then `RELISCORE__*` environment variables.

use anyhow::Result;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};

pub const CONFIG_FILE_ENV: &str = "RELISCORE_CONFIG_FILE";
pub const ENV_PREFIX: &str = "RELISCORE";

pub fn config_builder(service: &str) -> Result<ConfigBuilder<DefaultState>> {
    let mut builder = Config::builder().set_default("service_name", service)?;
    if let Ok(file) = std::env::var(CONFIG_FILE_ENV) {
        builder = builder.add_source(File::with_name(&file).required(false));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    Ok(builder)
}
