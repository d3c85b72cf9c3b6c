//! Bundle loader: one version directory in, one validated [`LoadedModel`] out.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{instrument, warn};

use crate::artifact::{
    FeatureScaler, FeatureSchemaDoc, ModelBundle, ModelMetrics, VersionMeta, BUNDLE_FILE, DEFAULT_HORIZON_DAYS,
    METRICS_FILE, SCHEMA_FILE, VERSION_FILE,
};
use crate::error::{Result, RiskEngineError};
use crate::predictor::PredictorSpec;

/// Read-only runtime view of one model version. Never mutated after construction;
/// the guard replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    /// Registry directory name the model was loaded from.
    pub version_id: String,
    /// Version reported to clients (`version.json` value, else the directory name).
    pub model_version: String,
    pub model_type: String,
    pub predictor: PredictorSpec,
    pub scaler: Option<FeatureScaler>,
    pub feature_columns: Vec<String>,
    pub fill_values: BTreeMap<String, f64>,
    pub feature_weights: BTreeMap<String, f64>,
    pub horizon_days: u32,
    pub metrics: ModelMetrics,
    pub meta: VersionMeta,
    /// Hex SHA-256 of the serialized bundle.
    pub bundle_digest: String,
}

#[instrument(skip(dir), fields(dir = %dir.display()))]
pub fn load_version(dir: &Path, version_id: &str) -> Result<LoadedModel> {
    let bundle_bytes = read_resource(dir, version_id, BUNDLE_FILE)?;
    let bundle: ModelBundle = parse(&bundle_bytes, version_id, BUNDLE_FILE)?;
    let meta: VersionMeta = parse(&read_resource(dir, version_id, VERSION_FILE)?, version_id, VERSION_FILE)?;
    let schema: FeatureSchemaDoc = parse(&read_resource(dir, version_id, SCHEMA_FILE)?, version_id, SCHEMA_FILE)?;
    let metrics_json: serde_json::Value = parse(&read_resource(dir, version_id, METRICS_FILE)?, version_id, METRICS_FILE)?;
    let metrics = ModelMetrics::from_json(metrics_json)
        .map_err(|reason| RiskEngineError::invalid(version_id, format!("{METRICS_FILE}: {reason}")))?;

    let feature_columns = resolve_feature_columns(version_id, &schema, &bundle.feature_columns)?;
    validate_bundle(version_id, &bundle, feature_columns.len())?;

    let model_version = meta
        .model_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(version_id)
        .to_string();
    let model_type = match (&bundle.model_type[..], &meta.selected_model) {
        ("UnknownModel", Some(selected)) => selected.clone(),
        _ => bundle.model_type.clone(),
    };
    let horizon_days = bundle.horizon_days.or(meta.horizon_days).unwrap_or(DEFAULT_HORIZON_DAYS);

    Ok(LoadedModel {
        version_id: version_id.to_string(),
        model_version,
        model_type,
        predictor: bundle.model,
        scaler: bundle.scaler,
        feature_columns,
        fill_values: bundle.fill_values,
        feature_weights: bundle.feature_weights,
        horizon_days,
        metrics,
        meta,
        bundle_digest: hex::encode(Sha256::digest(&bundle_bytes)),
    })
}

/// The schema file wins over the bundle's embedded list; either must be non-empty,
/// fully named and free of duplicates to be usable.
pub fn resolve_feature_columns(version_id: &str, schema: &FeatureSchemaDoc, embedded: &[String]) -> Result<Vec<String>> {
    let from_schema = schema.names();
    match usable_columns(&from_schema) {
        Ok(()) => return Ok(from_schema),
        Err(reason) if !from_schema.is_empty() => {
            warn!(version = %version_id, %reason, "feature schema unusable, trying bundle feature list");
        }
        Err(_) => {}
    }
    usable_columns(embedded).map_err(|reason| RiskEngineError::SchemaResolution {
        version: version_id.to_string(),
        reason: format!("schema file and bundle both unusable ({reason})"),
    })?;
    Ok(embedded.to_vec())
}

fn usable_columns(cols: &[String]) -> std::result::Result<(), String> {
    if cols.is_empty() {
        return Err("empty feature list".into());
    }
    if cols.iter().any(|c| c.trim().is_empty()) {
        return Err("feature list contains an unnamed column".into());
    }
    let mut seen = HashSet::with_capacity(cols.len());
    if let Some(dup) = cols.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(format!("duplicate feature column {dup}"));
    }
    Ok(())
}

fn validate_bundle(version_id: &str, bundle: &ModelBundle, n_features: usize) -> Result<()> {
    bundle
        .model
        .validate(n_features)
        .map_err(|reason| RiskEngineError::invalid(version_id, reason))?;
    if let Some(scaler) = &bundle.scaler {
        if scaler.mean.len() != n_features || scaler.scale.len() != n_features {
            return Err(RiskEngineError::invalid(
                version_id,
                format!("scaler has {}/{} entries for {} features", scaler.mean.len(), scaler.scale.len(), n_features),
            ));
        }
        if scaler.mean.iter().chain(&scaler.scale).any(|v| !v.is_finite()) {
            return Err(RiskEngineError::invalid(version_id, "scaler has non-finite entries"));
        }
    }
    for (name, map) in [("fill_values", &bundle.fill_values), ("feature_weights", &bundle.feature_weights)] {
        if let Some((k, _)) = map.iter().find(|(_, v)| !v.is_finite()) {
            return Err(RiskEngineError::invalid(version_id, format!("{name}[{k}] is not finite")));
        }
    }
    Ok(())
}

fn read_resource(dir: &Path, version_id: &str, file: &str) -> Result<Vec<u8>> {
    fs::read(dir.join(file)).map_err(|e| RiskEngineError::invalid(version_id, format!("{file}: {e}")))
}

fn parse<T: DeserializeOwned>(bytes: &[u8], version_id: &str, file: &str) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| RiskEngineError::invalid(version_id, format!("{file}: {e}")))
}
