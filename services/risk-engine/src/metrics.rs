//! Prometheus instruments for scoring and model reloads, on the default registry.

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts};

pub static SCORE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("reliscore_score_requests_total", "Scoring calls by outcome"), &["outcome"])
        .expect("static metric opts");
    register(c.clone());
    c
});

pub static SCORE_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(
        HistogramOpts::new("reliscore_score_latency_ms", "Per-row scoring latency in milliseconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0]),
    )
    .expect("static metric opts");
    register(h.clone());
    h
});

pub static MODEL_RELOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("reliscore_model_reloads_total", "Model loads by result"), &["result"])
        .expect("static metric opts");
    register(c.clone());
    c
});

fn register<C: Collector + 'static>(collector: C) {
    if let Err(e) = prometheus::register(Box::new(collector)) {
        tracing::debug!(error = %e, "metric already registered");
    }
}

pub fn record_score(outcome: &str, elapsed_ms: f64) {
    SCORE_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
    SCORE_LATENCY_MS.observe(elapsed_ms);
}

pub fn record_reload(result: &str) {
    MODEL_RELOADS_TOTAL.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_tolerated() {
        register(SCORE_REQUESTS_TOTAL.clone());
        record_score("ok", 0.2);
        assert!(SCORE_REQUESTS_TOTAL.with_label_values(&["ok"]).get() >= 1);
    }
}
