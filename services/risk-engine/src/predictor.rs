//! Opaque predictors consumed by the scoring engine.
//!
//! The engine only ever calls [`Predictor::probability`]; the serialized
//! [`PredictorSpec`] variants cover the model generations the trainers emit.

use serde::{Deserialize, Serialize};

/// Single-method capability: probability of the positive class for one row.
pub trait Predictor {
    fn probability(&self, x: &[f64]) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl Predictor for LinearModel {
    fn probability(&self, x: &[f64]) -> f64 {
        let z = self.coefficients.iter().zip(x).fold(self.intercept, |acc, (w, v)| acc + w * v);
        sigmoid(z)
    }
}

/// Depth-one regression tree in logit space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature_index: usize,
    pub threshold: f64,
    pub left_value: f64,
    pub right_value: f64,
}

impl Stump {
    fn eval(&self, x: &[f64]) -> f64 {
        match x.get(self.feature_index) {
            Some(v) if *v <= self.threshold => self.left_value,
            _ => self.right_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedStumps {
    #[serde(default)]
    pub base_score: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub stumps: Vec<Stump>,
}

fn default_learning_rate() -> f64 { 0.1 }

impl Predictor for BoostedStumps {
    fn probability(&self, x: &[f64]) -> f64 {
        let raw: f64 = self.stumps.iter().map(|s| s.eval(x)).sum();
        sigmoid(self.base_score + self.learning_rate * raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictorSpec {
    Linear(LinearModel),
    BoostedStumps(BoostedStumps),
    Averaged { members: Vec<PredictorSpec> },
}

impl Predictor for PredictorSpec {
    fn probability(&self, x: &[f64]) -> f64 {
        match self {
            Self::Linear(m) => m.probability(x),
            Self::BoostedStumps(m) => m.probability(x),
            Self::Averaged { members } => {
                if members.is_empty() { return 0.0; }
                members.iter().map(|m| m.probability(x)).sum::<f64>() / members.len() as f64
            }
        }
    }
}

impl PredictorSpec {
    /// Structural check against the resolved feature width.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        match self {
            Self::Linear(m) => {
                if m.coefficients.len() != n_features {
                    return Err(format!("linear model has {} coefficients for {} features", m.coefficients.len(), n_features));
                }
                if !m.intercept.is_finite() || m.coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("linear model has non-finite parameters".into());
                }
                Ok(())
            }
            Self::BoostedStumps(m) => {
                if m.stumps.is_empty() {
                    return Err("boosted ensemble has no stumps".into());
                }
                if !m.base_score.is_finite() || !m.learning_rate.is_finite() {
                    return Err("boosted ensemble has non-finite parameters".into());
                }
                for (i, s) in m.stumps.iter().enumerate() {
                    if s.feature_index >= n_features {
                        return Err(format!("stump {i} references feature {} of {n_features}", s.feature_index));
                    }
                    if ![s.threshold, s.left_value, s.right_value].iter().all(|v| v.is_finite()) {
                        return Err(format!("stump {i} has non-finite parameters"));
                    }
                }
                Ok(())
            }
            Self::Averaged { members } => {
                if members.is_empty() {
                    return Err("averaged ensemble has no members".into());
                }
                members.iter().try_for_each(|m| m.validate(n_features))
            }
        }
    }

    /// Short label used when the bundle carries no `model_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::BoostedStumps(_) => "boosted_stumps",
            Self::Averaged { .. } => "averaged",
        }
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
