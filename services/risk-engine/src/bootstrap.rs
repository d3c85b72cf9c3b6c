//! Deterministic fallback model for a completely empty registry.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{info, instrument};

use crate::artifact::{CalibrationEntry, FeatureSchemaDoc, ModelBundle, VersionMeta, DEFAULT_HORIZON_DAYS};
use crate::error::Result;
use crate::predictor::{sigmoid, LinearModel, Predictor, PredictorSpec};
use crate::store::{ArtifactStore, VersionDocuments};

pub const DEMO_FEATURES: [&str; 11] = [
    "age_days",
    "smart_5_mean_7d",
    "smart_5_slope_14d",
    "smart_197_max_30d",
    "smart_197_mean_7d",
    "smart_198_delta_7d",
    "smart_199_volatility_30d",
    "temperature_mean_7d",
    "read_latency_mean_7d",
    "write_latency_mean_7d",
    "missing_smart_197_30d",
];

const SEED: u64 = 42;
const ROWS: usize = 4000;
/// (column, weight) pairs of the latent risk signal.
const LATENT: [(usize, f64); 6] = [(0, 0.3), (1, 1.1), (3, 1.3), (4, 1.5), (5, 1.0), (9, 0.7)];
const LABEL_CUTOFF: f64 = 0.65;

const L2_C: f64 = 1.0;
const LEARNING_RATE: f64 = 0.5;
const ITERATIONS: usize = 600;
const CALIBRATION_BINS: usize = 10;

/// Fit, publish and activate a demo version; returns its id.
#[instrument(skip(store), fields(root = %store.root().display()))]
pub fn bootstrap_demo_model(store: &ArtifactStore) -> Result<String> {
    let now = Utc::now();
    let id = format!("demo-{}", now.format("%Y%m%d%H%M%S"));

    let (x, y) = synthetic_dataset(SEED);
    let model = fit_balanced_logistic(&x, &y);
    let probs: Vec<f64> = x.iter().map(|row| model.probability(row)).collect();
    let brier = brier_score(&probs, &y);

    let features: Vec<String> = DEMO_FEATURES.iter().map(|f| f.to_string()).collect();
    let fill_values: BTreeMap<String, f64> = features.iter().map(|f| (f.clone(), 0.0)).collect();
    let feature_weights: BTreeMap<String, f64> =
        features.iter().cloned().zip(model.coefficients.iter().copied()).collect();

    let docs = VersionDocuments {
        bundle: ModelBundle {
            model: PredictorSpec::Linear(model),
            scaler: None,
            model_type: "LogisticRegression".into(),
            feature_columns: features.clone(),
            fill_values,
            feature_weights,
            horizon_days: Some(DEFAULT_HORIZON_DAYS),
        },
        meta: VersionMeta {
            model_version: Some(id.clone()),
            train_date: Some(now),
            horizon_days: Some(DEFAULT_HORIZON_DAYS),
            selected_model: Some("LogisticRegression".into()),
            ..VersionMeta::default()
        },
        schema: FeatureSchemaDoc::Plain { features },
        metrics: json!({
            "brier_score": brier,
            "calibration": calibration_bins(&probs, &y),
            "note": "Demo synthetic model generated automatically.",
        }),
        model_card: Some(format!(
            "# Demo Model\n\nAuto-generated fallback model for local runs.\n\n\
             - rows: {ROWS} synthetic, seed {SEED}\n- horizon: {DEFAULT_HORIZON_DAYS} days\n- brier score: {brier:.4}\n"
        )),
    };

    store.publish_version(&id, &docs)?;
    store.set_active(&id)?;
    info!(version = %id, brier, "bootstrapped demo model");
    Ok(id)
}

/// Standard-normal matrix with thresholded logistic labels.
pub fn synthetic_dataset(seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let cols = DEMO_FEATURES.len();
    let mut normals = std::iter::from_fn(move || Some(box_muller(&mut rng))).flat_map(|(a, b)| [a, b]);

    let mut x = Vec::with_capacity(ROWS);
    let mut y = Vec::with_capacity(ROWS);
    for _ in 0..ROWS {
        let row: Vec<f64> = normals.by_ref().take(cols).collect();
        let latent: f64 = LATENT.iter().map(|(i, w)| w * row[*i]).sum();
        y.push(if sigmoid(latent) > LABEL_CUTOFF { 1.0 } else { 0.0 });
        x.push(row);
    }
    (x, y)
}

fn box_muller(rng: &mut StdRng) -> (f64, f64) {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * PI * u2;
    (r * theta.cos(), r * theta.sin())
}

/// L2-regularized logistic regression with inverse-frequency class weights,
/// full-batch gradient descent on the mean weighted log loss.
pub fn fit_balanced_logistic(x: &[Vec<f64>], y: &[f64]) -> LinearModel {
    let n = x.len().max(1) as f64;
    let d = x.first().map(Vec::len).unwrap_or(0);
    let positives = y.iter().filter(|v| **v > 0.5).count() as f64;
    let negatives = y.len() as f64 - positives;
    let w_pos = n / (2.0 * positives.max(1.0));
    let w_neg = n / (2.0 * negatives.max(1.0));

    let mut coef = vec![0.0; d];
    let mut intercept = 0.0;
    for _ in 0..ITERATIONS {
        let mut grad = vec![0.0; d];
        let mut grad_b = 0.0;
        for (row, label) in x.iter().zip(y) {
            let z = row.iter().zip(&coef).fold(intercept, |acc, (v, w)| acc + v * w);
            let weight = if *label > 0.5 { w_pos } else { w_neg };
            let err = weight * (sigmoid(z) - label);
            for (g, v) in grad.iter_mut().zip(row) {
                *g += err * v;
            }
            grad_b += err;
        }
        for (w, g) in coef.iter_mut().zip(&grad) {
            *w -= LEARNING_RATE * (g / n + *w / (L2_C * n));
        }
        intercept -= LEARNING_RATE * grad_b / n;
    }
    LinearModel { coefficients: coef, intercept }
}

fn brier_score(probs: &[f64], y: &[f64]) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    probs.iter().zip(y).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / probs.len() as f64
}

/// Equal-width reliability bins over [0, 1]; empty bins are omitted.
fn calibration_bins(probs: &[f64], y: &[f64]) -> Vec<CalibrationEntry> {
    let mut sums = [(0.0_f64, 0.0_f64, 0_u64); CALIBRATION_BINS];
    for (p, t) in probs.iter().zip(y) {
        let bin = ((p * CALIBRATION_BINS as f64) as usize).min(CALIBRATION_BINS - 1);
        sums[bin].0 += p;
        sums[bin].1 += t;
        sums[bin].2 += 1;
    }
    sums.iter()
        .enumerate()
        .filter(|(_, (_, _, count))| *count > 0)
        .map(|(i, (p, t, count))| CalibrationEntry::Binned {
            bin_left: i as f64 / CALIBRATION_BINS as f64,
            bin_right: (i + 1) as f64 / CALIBRATION_BINS as f64,
            predicted_mean: p / *count as f64,
            observed_rate: t / *count as f64,
            count: *count,
        })
        .collect()
}
