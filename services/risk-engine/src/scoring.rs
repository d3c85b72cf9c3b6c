//! Scoring engine: strict schema check, imputation, optional standardization,
//! inference, bucketing and ranked reason codes. Pure function of (snapshot, request).

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskEngineError};
use crate::loader::LoadedModel;
use crate::predictor::Predictor;

pub const HIGH_THRESHOLD: f64 = 0.75;
pub const MED_THRESHOLD: f64 = 0.4;
pub const MAX_REASONS: usize = 5;

/// Feature name to value; `None` means unknown and gets imputed.
pub type FeatureMap = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskBucket {
    Low,
    Med,
    High,
}

impl RiskBucket {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD {
            Self::High
        } else if score >= MED_THRESHOLD {
            Self::Med
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonCode {
    #[serde(rename = "code")]
    pub feature: String,
    pub contribution: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub drive_id: String,
    pub day: NaiveDate,
    pub features: FeatureMap,
}

/// Wire form of a request: feature values are still untyped JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScoreRequest {
    pub drive_id: String,
    pub day: NaiveDate,
    pub features: serde_json::Map<String, serde_json::Value>,
}

impl RawScoreRequest {
    /// `null` imputes, numbers pass through, anything else is rejected by name.
    pub fn into_request(self) -> Result<ScoreRequest> {
        let mut features = FeatureMap::new();
        for (name, value) in self.features {
            let parsed = match &value {
                serde_json::Value::Null => None,
                serde_json::Value::Number(n) => Some(n.as_f64().ok_or_else(|| RiskEngineError::InvalidFeatureValue {
                    feature: name.clone(),
                    reason: format!("{n} is not representable as f64"),
                })?),
                other => {
                    return Err(RiskEngineError::InvalidFeatureValue {
                        feature: name,
                        reason: format!("expected number or null, got {other}"),
                    })
                }
            };
            features.insert(name, parsed);
        }
        Ok(ScoreRequest { drive_id: self.drive_id, day: self.day, features })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub drive_id: String,
    pub day: NaiveDate,
    pub risk_score: f64,
    pub risk_bucket: RiskBucket,
    pub top_reasons: Vec<ReasonCode>,
    pub model_version: String,
    pub scored_at: DateTime<Utc>,
}

/// Model output for one row, before request metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub risk_score: f64,
    pub risk_bucket: RiskBucket,
    pub top_reasons: Vec<ReasonCode>,
}

pub fn score_request(loaded: &LoadedModel, req: &ScoreRequest, scored_at: DateTime<Utc>) -> Result<ScoreResult> {
    let scored = score(loaded, &req.features)?;
    Ok(ScoreResult {
        drive_id: req.drive_id.clone(),
        day: req.day,
        risk_score: scored.risk_score,
        risk_bucket: scored.risk_bucket,
        top_reasons: scored.top_reasons,
        model_version: loaded.model_version.clone(),
        scored_at,
    })
}

pub fn score(loaded: &LoadedModel, features: &FeatureMap) -> Result<Scored> {
    check_schema(&loaded.feature_columns, features)?;

    let mut row = Vec::with_capacity(loaded.feature_columns.len());
    for column in &loaded.feature_columns {
        let value = match features.get(column).copied().flatten() {
            None => loaded.fill_values.get(column).copied().unwrap_or(0.0),
            Some(v) if !v.is_finite() => {
                return Err(RiskEngineError::InvalidFeatureValue { feature: column.clone(), reason: format!("{v} is not finite") })
            }
            Some(v) => v,
        };
        row.push(value);
    }
    if let Some(scaler) = &loaded.scaler {
        scaler.transform(&mut row);
    }

    let raw = loaded.predictor.probability(&row);
    if raw.is_nan() {
        return Err(RiskEngineError::Inference(raw));
    }
    let risk_score = raw.clamp(0.0, 1.0);

    Ok(Scored {
        risk_score,
        risk_bucket: RiskBucket::from_score(risk_score),
        top_reasons: explain(&loaded.feature_columns, &loaded.feature_weights, &row),
    })
}

/// Exact key-set match; both difference sets come back sorted.
pub fn check_schema(columns: &[String], features: &FeatureMap) -> Result<()> {
    let expected: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let mut missing: Vec<String> = columns.iter().filter(|c| !features.contains_key(*c)).cloned().collect();
    missing.sort();
    let extra: Vec<String> = features.keys().filter(|k| !expected.contains(k.as_str())).cloned().collect();
    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }
    Err(RiskEngineError::SchemaMismatch { missing, extra })
}

/// `weight * value` over the exact vector fed to the predictor, rounded to 6 decimals, largest
/// magnitude first, ties by feature name.
pub fn explain(columns: &[String], weights: &BTreeMap<String, f64>, row: &[f64]) -> Vec<ReasonCode> {
    let mut contributions: Vec<(&str, f64, f64)> = columns
        .iter()
        .zip(row)
        .map(|(name, value)| {
            let raw = weights.get(name).copied().unwrap_or(0.0) * value;
            (name.as_str(), raw, round6(raw))
        })
        .collect();
    contributions.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()).then_with(|| a.0.cmp(b.0)));
    contributions
        .into_iter()
        .take(MAX_REASONS)
        .map(|(name, raw, rounded)| ReasonCode {
            feature: name.to_string(),
            contribution: rounded,
            direction: if raw >= 0.0 { Direction::Up } else { Direction::Down },
        })
        .collect()
}

fn round6(v: f64) -> f64 { (v * 1e6).round() / 1e6 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{FeatureScaler, ModelMetrics, VersionMeta};
    use crate::predictor::{LinearModel, PredictorSpec};

    fn model(cols: &[&str], weights: &[(&str, f64)]) -> LoadedModel {
        LoadedModel {
            version_id: "v-test".into(),
            model_version: "v-test".into(),
            model_type: "LogisticRegression".into(),
            predictor: PredictorSpec::Linear(LinearModel {
                coefficients: cols.iter().map(|c| weights.iter().find(|(n, _)| n == c).map(|(_, w)| *w).unwrap_or(0.0)).collect(),
                intercept: 0.0,
            }),
            scaler: None,
            feature_columns: cols.iter().map(|s| s.to_string()).collect(),
            fill_values: BTreeMap::new(),
            feature_weights: weights.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            horizon_days: 14,
            metrics: ModelMetrics::default(),
            meta: VersionMeta::default(),
            bundle_digest: String::new(),
        }
    }

    fn features(pairs: &[(&str, Option<f64>)]) -> FeatureMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn bucket_boundaries_are_inclusive() {
        assert_eq!(RiskBucket::from_score(0.75), RiskBucket::High);
        assert_eq!(RiskBucket::from_score(0.7499), RiskBucket::Med);
        assert_eq!(RiskBucket::from_score(0.4), RiskBucket::Med);
        assert_eq!(RiskBucket::from_score(0.3999), RiskBucket::Low);
        assert_eq!(RiskBucket::from_score(0.0), RiskBucket::Low);
        assert_eq!(RiskBucket::from_score(1.0), RiskBucket::High);
    }

    #[test]
    fn explanation_ranks_by_magnitude() {
        let m = model(&["a", "b", "c"], &[("a", 2.0), ("b", -3.0), ("c", 0.5)]);
        let out = score(&m, &features(&[("a", Some(1.0)), ("b", Some(1.0)), ("c", Some(1.0))])).unwrap();
        let names: Vec<&str> = out.top_reasons.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(out.top_reasons[0].contribution, -3.0);
        assert_eq!(out.top_reasons[0].direction, Direction::Down);
        assert_eq!(out.top_reasons[1].contribution, 2.0);
        assert_eq!(out.top_reasons[1].direction, Direction::Up);
        assert_eq!(out.top_reasons[2].contribution, 0.5);
    }

    #[test]
    fn ties_break_by_feature_name_and_cap_at_five() {
        let cols = ["f", "e", "d", "c", "b", "a"];
        let m = model(&cols, &cols.iter().map(|c| (*c, 1.0)).collect::<Vec<_>>());
        let req = features(&cols.iter().map(|c| (*c, Some(1.0))).collect::<Vec<_>>());
        let out = score(&m, &req).unwrap();
        let names: Vec<&str> = out.top_reasons.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn ties_after_rounding_order_by_name() {
        let cols = vec!["b".to_string(), "a".to_string()];
        let weights: BTreeMap<String, f64> = [("b".to_string(), 1.0), ("a".to_string(), 1.0)].into_iter().collect();
        let reasons = explain(&cols, &weights, &[0.1234562, 0.1234558]);
        let names: Vec<&str> = reasons.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reasons[0].contribution, reasons[1].contribution);
    }

    #[test]
    fn zero_contribution_points_up() {
        let m = model(&["a"], &[]);
        let out = score(&m, &features(&[("a", Some(4.0))])).unwrap();
        assert_eq!(out.top_reasons[0].contribution, 0.0);
        assert_eq!(out.top_reasons[0].direction, Direction::Up);
        assert!((out.risk_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn schema_mismatch_lists_missing_and_extra() {
        let m = model(&["a", "b"], &[]);
        let err = score(&m, &features(&[("a", Some(1.0)), ("zz", Some(1.0))])).unwrap_err();
        match err {
            RiskEngineError::SchemaMismatch { missing, extra } => {
                assert_eq!(missing, vec!["b"]);
                assert_eq!(extra, vec!["zz"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nulls_take_fill_values_then_zero() {
        let mut m = model(&["a", "b"], &[("a", 1.0), ("b", 1.0)]);
        m.fill_values.insert("a".into(), 3.0);
        let out = score(&m, &features(&[("a", None), ("b", None)])).unwrap();
        let a = out.top_reasons.iter().find(|r| r.feature == "a").unwrap();
        let b = out.top_reasons.iter().find(|r| r.feature == "b").unwrap();
        assert_eq!(a.contribution, 3.0);
        assert_eq!(b.contribution, 0.0);
    }

    #[test]
    fn contributions_use_scaled_values() {
        let mut m = model(&["a", "b"], &[("a", 1.0), ("b", 1.0)]);
        m.scaler = Some(FeatureScaler { mean: vec![10.0, 1.0], scale: vec![2.0, 0.0] });
        let out = score(&m, &features(&[("a", Some(14.0)), ("b", Some(3.0))])).unwrap();
        let a = out.top_reasons.iter().find(|r| r.feature == "a").unwrap();
        let b = out.top_reasons.iter().find(|r| r.feature == "b").unwrap();
        assert_eq!(a.contribution, 2.0);
        assert_eq!(b.contribution, 2.0);
    }

    #[test]
    fn non_finite_value_is_rejected() {
        let m = model(&["a"], &[]);
        let err = score(&m, &features(&[("a", Some(f64::NAN))])).unwrap_err();
        assert!(matches!(err, RiskEngineError::InvalidFeatureValue { ref feature, .. } if feature == "a"));
    }

    #[test]
    fn raw_request_rejects_non_numeric_values() {
        let raw: RawScoreRequest = serde_json::from_value(serde_json::json!({
            "drive_id": "d1", "day": "2026-02-20", "features": {"a": 1, "b": null, "c": "high"}
        }))
        .unwrap();
        let err = raw.into_request().unwrap_err();
        assert!(matches!(err, RiskEngineError::InvalidFeatureValue { ref feature, .. } if feature == "c"));

        let ok: RawScoreRequest = serde_json::from_value(serde_json::json!({
            "drive_id": "d1", "day": "2026-02-20", "features": {"a": 1, "b": null}
        }))
        .unwrap();
        let req = ok.into_request().unwrap();
        assert_eq!(req.features.get("a"), Some(&Some(1.0)));
        assert_eq!(req.features.get("b"), Some(&None));
    }

    #[test]
    fn score_request_carries_version_and_stays_in_unit_interval() {
        let m = model(&["a"], &[("a", 50.0)]);
        let req = ScoreRequest { drive_id: "d1".into(), day: NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(), features: features(&[("a", Some(1e9))]) };
        let res = score_request(&m, &req, Utc::now()).unwrap();
        assert!((0.0..=1.0).contains(&res.risk_score));
        assert_eq!(res.risk_bucket, RiskBucket::High);
        assert_eq!(res.model_version, "v-test");
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["risk_bucket"], "HIGH");
        assert_eq!(json["top_reasons"][0]["code"], "a");
        assert_eq!(json["top_reasons"][0]["direction"], "UP");
    }
}
