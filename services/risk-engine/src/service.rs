//! Transport-agnostic service context handed to request handlers.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::artifact::ModelMetrics;
use crate::error::Result;
use crate::guard::ModelHandle;
use crate::loader::LoadedModel;
use crate::metrics;
use crate::scoring::{self, RawScoreRequest, ScoreRequest, ScoreResult};
use crate::store::VersionEntry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_version: String,
    pub model_type: String,
    pub horizon_days: u32,
    pub features: Vec<String>,
    pub metrics: ModelMetrics,
    pub version_id: String,
    pub bundle_digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_range: Option<(NaiveDate, NaiveDate)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_range: Option<(NaiveDate, NaiveDate)>,
}

impl From<&LoadedModel> for ModelInfo {
    fn from(m: &LoadedModel) -> Self {
        let ranges = m.meta.data_ranges();
        Self {
            model_version: m.model_version.clone(),
            model_type: m.model_type.clone(),
            horizon_days: m.horizon_days,
            features: m.feature_columns.clone(),
            metrics: m.metrics.clone(),
            version_id: m.version_id.clone(),
            bundle_digest: m.bundle_digest.clone(),
            train_date: m.meta.train_date,
            train_range: ranges.as_ref().map(|(train, _)| (train.start, train.end)),
            test_range: ranges.as_ref().map(|(_, test)| (test.start, test.end)),
        }
    }
}

#[derive(Clone)]
pub struct RiskService {
    handle: Arc<ModelHandle>,
}

impl RiskService {
    pub fn new(handle: Arc<ModelHandle>) -> Self { Self { handle } }

    pub fn handle(&self) -> &Arc<ModelHandle> { &self.handle }

    /// Reports the published snapshot without triggering a load.
    pub fn get_health(&self) -> Health {
        match self.handle.snapshot() {
            Some(m) => Health { status: "ok", model_loaded: true, model_version: Some(m.model_version.clone()) },
            None => Health { status: "degraded", model_loaded: false, model_version: None },
        }
    }

    pub fn get_model_info(&self) -> Result<ModelInfo> {
        let model = self.handle.get_or_load()?;
        Ok(ModelInfo::from(model.as_ref()))
    }

    pub fn score(&self, req: &ScoreRequest) -> Result<ScoreResult> {
        let model = self.handle.get_or_load()?;
        score_one(&model, req, Utc::now())
    }

    /// One snapshot and one timestamp for the whole batch; items succeed or fail independently.
    pub fn score_batch(&self, items: &[ScoreRequest]) -> Result<Vec<Result<ScoreResult>>> {
        self.score_items(items.iter().cloned().map(Ok))
    }

    /// Batch entry point for wire requests whose feature values are not yet typed.
    pub fn score_raw_batch(&self, items: Vec<RawScoreRequest>) -> Result<Vec<Result<ScoreResult>>> {
        self.score_items(items.into_iter().map(RawScoreRequest::into_request))
    }

    pub fn reload(&self) -> Result<ModelInfo> {
        let model = self.handle.reload()?;
        Ok(ModelInfo::from(model.as_ref()))
    }

    pub fn refresh(&self) -> Result<bool> { self.handle.refresh_if_changed() }

    pub fn list_versions(&self) -> Result<Vec<VersionEntry>> { self.handle.store().list_versions() }

    fn score_items(&self, items: impl Iterator<Item = Result<ScoreRequest>>) -> Result<Vec<Result<ScoreResult>>> {
        let model = self.handle.get_or_load()?;
        let scored_at = Utc::now();
        let out: Vec<_> = items
            .map(|item| {
                item.map_err(|e| {
                    metrics::record_score(e.code(), 0.0);
                    e
                })
                .and_then(|req| score_one(&model, &req, scored_at))
            })
            .collect();
        debug!(items = out.len(), version = %model.version_id, "scored batch");
        Ok(out)
    }
}

fn score_one(model: &LoadedModel, req: &ScoreRequest, scored_at: DateTime<Utc>) -> Result<ScoreResult> {
    let started = Instant::now();
    let result = scoring::score_request(model, req, scored_at);
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match &result {
        Ok(_) => metrics::record_score("ok", elapsed_ms),
        Err(e) => {
            metrics::record_score(e.code(), elapsed_ms);
            debug!(drive_id = %req.drive_id, error = %e, "score rejected");
        }
    }
    result
}
