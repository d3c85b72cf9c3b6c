//! Core shared utilities for ReliScore services.
//!
//! Tracing setup, layered configuration and the liveness/readiness/metrics routes every
//! service binary mounts next to its own API.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub mod config;
pub mod health;

pub use config::config_builder;
pub use health::{clear_ready, health_routes, is_live, is_ready, mark_not_live, mark_ready, render_metrics};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber once per process.
///
/// `RUST_LOG` drives the filter (defaults to `info`); `RELISCORE_JSON_LOG=1` switches the
/// formatter to flattened JSON lines for log shippers.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = env_flag("RELISCORE_JSON_LOG");
        let fmt_layer = if json {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .boxed()
        };
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry().with(fmt_layer).with(env_filter).try_init()?;
        Ok(())
    })?;
    info!(target: "reliscore", service, "tracing initialized");
    Ok(())
}

/// `1`/`true` (any case) count as set; anything else, or absence, does not.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}
