//! On-disk documents that make up one model version directory.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::predictor::PredictorSpec;

pub const BUNDLE_FILE: &str = "model.json";
pub const VERSION_FILE: &str = "version.json";
pub const SCHEMA_FILE: &str = "feature_schema.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const MODEL_CARD_FILE: &str = "model_card.md";
pub const ACTIVE_POINTER_FILE: &str = "ACTIVE_MODEL";

/// A version directory is only a candidate when every one of these is a regular file.
pub const REQUIRED_FILES: [&str; 4] = [BUNDLE_FILE, VERSION_FILE, SCHEMA_FILE, METRICS_FILE];

pub const DEFAULT_HORIZON_DAYS: u32 = 14;

/// Per-feature standardization fitted alongside the predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    /// `(x - mean) / scale` in place; a zero scale is treated as one.
    pub fn transform(&self, x: &mut [f64]) {
        for ((v, mean), scale) in x.iter_mut().zip(&self.mean).zip(&self.scale) {
            let scale = if *scale == 0.0 { 1.0 } else { *scale };
            *v = (*v - mean) / scale;
        }
    }
}

fn default_model_type() -> String { "UnknownModel".into() }

/// Contents of `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model: PredictorSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<FeatureScaler>,
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default)]
    pub feature_columns: Vec<String>,
    #[serde(default)]
    pub fill_values: BTreeMap<String, f64>,
    #[serde(default)]
    pub feature_weights: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedDataWindow {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// Contents of `version.json`. Trainers of different generations emit either the
/// `trained_data_window` block or the `train_range`/`test_range` pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_days: Option<u32>,
    #[serde(default, alias = "model_type", skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_data_window: Option<TrainedDataWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_manifest_hash: Option<String>,
}

impl VersionMeta {
    /// Train and test ranges regardless of which layout the trainer wrote.
    pub fn data_ranges(&self) -> Option<(DateRange, DateRange)> {
        if let Some(w) = &self.trained_data_window {
            return Some((
                DateRange { start: w.train_start, end: w.train_end },
                DateRange { start: w.test_start, end: w.test_end },
            ));
        }
        match (&self.train_range, &self.test_range) {
            (Some(train), Some(test)) => Some((train.clone(), test.clone())),
            _ => None,
        }
    }
}

fn default_dtype() -> String { "float".into() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedFeature {
    pub name: String,
    #[serde(default = "default_dtype")]
    pub dtype: String,
}

/// Contents of `feature_schema.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureSchemaDoc {
    Ordered {
        ordered_features: Vec<OrderedFeature>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label_column: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        horizon_days: Option<u32>,
    },
    Plain {
        features: Vec<String>,
    },
}

impl FeatureSchemaDoc {
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Ordered { ordered_features, .. } => ordered_features.iter().map(|f| f.name.clone()).collect(),
            Self::Plain { features } => features.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

/// One reliability-curve entry; both trainer layouts are kept as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalibrationEntry {
    Binned {
        bin_left: f64,
        bin_right: f64,
        predicted_mean: f64,
        observed_rate: f64,
        count: u64,
    },
    Pair {
        predicted: f64,
        observed: f64,
    },
}

impl CalibrationEntry {
    pub fn predicted(&self) -> f64 {
        match self {
            Self::Binned { predicted_mean, .. } => *predicted_mean,
            Self::Pair { predicted, .. } => *predicted,
        }
    }

    pub fn observed(&self) -> f64 {
        match self {
            Self::Binned { observed_rate, .. } => *observed_rate,
            Self::Pair { observed, .. } => *observed,
        }
    }
}

const CALIBRATION_KEYS: [&str; 2] = ["calibration_curve", "calibration"];

/// Parsed `metrics.json`: open scalar map plus an ordered calibration curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelMetrics {
    #[serde(flatten)]
    pub scalars: BTreeMap<String, MetricValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calibration: Vec<CalibrationEntry>,
}

impl ModelMetrics {
    pub fn from_json(value: serde_json::Value) -> Result<Self, String> {
        let serde_json::Value::Object(map) = value else {
            return Err("metrics document is not a JSON object".into());
        };
        let mut out = ModelMetrics::default();
        for (key, v) in map {
            if CALIBRATION_KEYS.contains(&key.as_str()) {
                out.calibration = serde_json::from_value(v).map_err(|e| format!("calibration curve: {e}"))?;
                continue;
            }
            match v {
                serde_json::Value::Number(_) | serde_json::Value::Bool(_) | serde_json::Value::String(_) => {
                    let parsed: MetricValue = serde_json::from_value(v).map_err(|e| format!("metric {key}: {e}"))?;
                    out.scalars.insert(key, parsed);
                }
                _ => tracing::debug!(metric = %key, "skipping non-scalar metric"),
            }
        }
        Ok(out)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.scalars.get(key) {
            Some(MetricValue::Number(n)) => Some(*n),
            _ => None,
        }
    }
}
