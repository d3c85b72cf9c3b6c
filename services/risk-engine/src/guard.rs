//! Concurrency guard around the published [`LoadedModel`] snapshot.
//!
//! Readers take a lock-free `Arc` clone of the current snapshot and keep it for the
//! whole call. Loads build a fresh model off to the side under `reload_lock` and then
//! swap the pointer; a failed load never touches what is already published.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::loader::LoadedModel;
use crate::metrics;
use crate::store::ArtifactStore;

pub struct ModelHandle {
    store: ArtifactStore,
    requested: Option<String>,
    current: ArcSwapOption<LoadedModel>,
    reload_lock: Mutex<()>,
}

impl ModelHandle {
    pub fn new(store: ArtifactStore, requested: Option<String>) -> Self {
        Self { store, requested, current: ArcSwapOption::empty(), reload_lock: Mutex::new(()) }
    }

    pub fn store(&self) -> &ArtifactStore { &self.store }

    pub fn requested_version(&self) -> Option<&str> { self.requested.as_deref() }

    /// Currently published model, if any load has succeeded.
    pub fn snapshot(&self) -> Option<Arc<LoadedModel>> { self.current.load_full() }

    /// Published snapshot, loading it on first use. Concurrent first callers wait on the
    /// same lock and observe the single load that won.
    pub fn get_or_load(&self) -> Result<Arc<LoadedModel>> {
        if let Some(m) = self.current.load_full() {
            return Ok(m);
        }
        let _guard = self.reload_lock.lock();
        if let Some(m) = self.current.load_full() {
            return Ok(m);
        }
        self.load_locked()
    }

    /// Re-resolve and reload unconditionally.
    pub fn reload(&self) -> Result<Arc<LoadedModel>> {
        let _guard = self.reload_lock.lock();
        self.load_locked()
    }

    /// Reload only when resolution now names a different version than the snapshot.
    /// Returns whether a new snapshot was published.
    pub fn refresh_if_changed(&self) -> Result<bool> {
        let _guard = self.reload_lock.lock();
        let id = match self.store.resolve_version(self.requested.as_deref()) {
            Ok(id) => id,
            Err(e) => {
                metrics::record_reload("error");
                return Err(e);
            }
        };
        if self.current.load_full().is_some_and(|m| m.version_id == id) {
            return Ok(false);
        }
        self.publish(&id, Instant::now())?;
        Ok(true)
    }

    #[instrument(skip(self), fields(requested = ?self.requested))]
    fn load_locked(&self) -> Result<Arc<LoadedModel>> {
        let started = Instant::now();
        let id = self.store.resolve_version(self.requested.as_deref()).map_err(|e| {
            metrics::record_reload("error");
            warn!(error = %e, "model version resolution failed");
            e
        })?;
        self.publish(&id, started)
    }

    fn publish(&self, id: &str, started: Instant) -> Result<Arc<LoadedModel>> {
        match self.store.load(id) {
            Ok(model) => {
                let model = Arc::new(model);
                let previous = self.current.swap(Some(model.clone()));
                metrics::record_reload("ok");
                info!(
                    version = %model.version_id,
                    kind = model.predictor.kind(),
                    previous = ?previous.as_ref().map(|p| p.version_id.as_str()),
                    elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                    "model snapshot published"
                );
                Ok(model)
            }
            Err(e) => {
                metrics::record_reload("error");
                warn!(version = %id, error = %e, "model load failed; keeping current snapshot");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{FeatureSchemaDoc, ModelBundle, VersionMeta, BUNDLE_FILE};
    use crate::predictor::{LinearModel, PredictorSpec};
    use crate::store::VersionDocuments;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn docs() -> VersionDocuments {
        VersionDocuments {
            bundle: ModelBundle {
                model: PredictorSpec::Linear(LinearModel { coefficients: vec![1.0], intercept: 0.0 }),
                scaler: None,
                model_type: "LogisticRegression".into(),
                feature_columns: vec!["a".into()],
                fill_values: BTreeMap::new(),
                feature_weights: BTreeMap::new(),
                horizon_days: None,
            },
            meta: VersionMeta::default(),
            schema: FeatureSchemaDoc::Plain { features: vec!["a".into()] },
            metrics: serde_json::json!({}),
            model_card: None,
        }
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        store.publish_version("v1", &docs()).unwrap();
        store.set_active("v1").unwrap();
        let handle = ModelHandle::new(store.clone(), None);
        assert_eq!(handle.get_or_load().unwrap().version_id, "v1");

        store.publish_version("v2", &docs()).unwrap();
        store.set_active("v2").unwrap();
        std::fs::write(tmp.path().join("v2").join(BUNDLE_FILE), "garbage").unwrap();

        let err = handle.reload().unwrap_err();
        assert_eq!(err.code(), "invalid_artifact");
        assert_eq!(handle.snapshot().unwrap().version_id, "v1");
    }

    #[test]
    fn refresh_swaps_only_on_change() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        store.publish_version("v1", &docs()).unwrap();
        store.set_active("v1").unwrap();
        let handle = ModelHandle::new(store.clone(), None);
        let first = handle.get_or_load().unwrap();
        assert!(!handle.refresh_if_changed().unwrap());
        assert!(Arc::ptr_eq(&first, &handle.snapshot().unwrap()));

        store.publish_version("v2", &docs()).unwrap();
        store.set_active("v2").unwrap();
        assert!(handle.refresh_if_changed().unwrap());
        assert_eq!(handle.snapshot().unwrap().version_id, "v2");
        // the reader that captured v1 still holds a complete v1
        assert_eq!(first.version_id, "v1");
    }

    #[test]
    fn explicit_miss_does_not_publish() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        let handle = ModelHandle::new(store, Some("v9".into()));
        assert_eq!(handle.get_or_load().unwrap_err().code(), "version_not_found");
        assert!(handle.snapshot().is_none());
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }
}
