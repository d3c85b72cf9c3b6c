//! On-disk registry of model versions and the `ACTIVE_MODEL` pointer.
//!
//! Resolution precedence for [`ArtifactStore::resolve_version`]:
//! 1. explicit request (anything but `latest`) must name a valid version,
//! 2. the active pointer, when it names a valid version,
//! 3. the newest valid version directory (mtime, then greatest id),
//! 4. a freshly bootstrapped demo model, when no directory qualifies and no version was
//!    explicitly requested.
//!
//! Writers stage a whole version in a hidden directory and publish it with one rename, so
//! readers never see a half-written version. Hidden entries are never candidates.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::artifact::{
    FeatureSchemaDoc, ModelBundle, VersionMeta, ACTIVE_POINTER_FILE, BUNDLE_FILE, METRICS_FILE, MODEL_CARD_FILE,
    REQUIRED_FILES, SCHEMA_FILE, VERSION_FILE,
};
use crate::config::LATEST;
use crate::error::{Result, RiskEngineError};
use crate::loader::{self, LoadedModel};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(skip)]
    pub modified: SystemTime,
    pub modified_at: DateTime<Utc>,
}

/// Everything needed to publish one version directory.
#[derive(Debug, Clone)]
pub struct VersionDocuments {
    pub bundle: ModelBundle,
    pub meta: VersionMeta,
    pub schema: FeatureSchemaDoc,
    pub metrics: serde_json::Value,
    pub model_card: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    bootstrap_demo: bool,
}

impl ArtifactStore {
    /// Open (creating if needed) the registry root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(RiskEngineError::Configuration { path: root, reason: "not a directory".into() });
        }
        fs::create_dir_all(&root)
            .map_err(|e| RiskEngineError::Configuration { path: root.clone(), reason: e.to_string() })?;
        Ok(Self { root, bootstrap_demo: true })
    }

    pub fn with_bootstrap(mut self, enabled: bool) -> Self {
        self.bootstrap_demo = enabled;
        self
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Directory for `id`, or `None` when the id could escape the root.
    pub fn version_dir(&self, id: &str) -> Option<PathBuf> {
        if !is_plain_id(id) { return None; }
        Some(self.root.join(id))
    }

    /// All required resources present as regular files.
    pub fn is_valid_version(&self, id: &str) -> bool {
        self.version_dir(id).map(|dir| is_complete_dir(&dir)).unwrap_or(false)
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn resolve_version(&self, requested: Option<&str>) -> Result<String> {
        if let Some(req) = requested.map(str::trim).filter(|r| !r.is_empty() && *r != LATEST) {
            if self.is_valid_version(req) {
                debug!(version = %req, "resolved explicit version");
                return Ok(req.to_string());
            }
            return Err(RiskEngineError::VersionNotFound(req.to_string()));
        }

        if let Some(active) = self.read_active_pointer()? {
            if self.is_valid_version(&active) {
                debug!(version = %active, "resolved via active pointer");
                return Ok(active);
            }
            warn!(version = %active, "active pointer names a missing or incomplete version");
        }

        if let Some(newest) = self.list_versions()?.into_iter().next() {
            debug!(version = %newest.id, "resolved newest version by scan");
            return Ok(newest.id);
        }

        if !self.bootstrap_demo {
            return Err(RiskEngineError::EmptyRegistry(self.root.clone()));
        }
        crate::bootstrap::bootstrap_demo_model(self)
    }

    pub fn read_active_pointer(&self) -> Result<Option<String>> {
        let path = self.root.join(ACTIVE_POINTER_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let id = text.trim();
                Ok(if id.is_empty() { None } else { Some(id.to_string()) })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RiskEngineError::io(path, e)),
        }
    }

    /// Point `ACTIVE_MODEL` at an existing valid version (temp file + rename).
    pub fn set_active(&self, id: &str) -> Result<()> {
        if !self.is_valid_version(id) {
            return Err(RiskEngineError::VersionNotFound(id.to_string()));
        }
        let tmp = self.root.join(format!(".{ACTIVE_POINTER_FILE}.tmp-{}", nonce()));
        fs::write(&tmp, id).map_err(|e| RiskEngineError::io(&tmp, e))?;
        let target = self.root.join(ACTIVE_POINTER_FILE);
        fs::rename(&tmp, &target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            RiskEngineError::io(&target, e)
        })?;
        info!(version = %id, "active pointer updated");
        Ok(())
    }

    /// Valid versions, newest first; equal mtimes order by descending id.
    pub fn list_versions(&self) -> Result<Vec<VersionEntry>> {
        let mut out = Vec::new();
        for id in self.version_like_dirs()? {
            let dir = self.root.join(&id);
            if !is_complete_dir(&dir) { continue; }
            let Some(modified) = modified_time(&dir) else { continue };
            out.push(VersionEntry { id, modified, modified_at: DateTime::<Utc>::from(modified) });
        }
        out.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.id.cmp(&a.id)));
        Ok(out)
    }

    /// Write a complete version under a hidden staging name, then rename it into place.
    #[instrument(skip(self, docs), fields(root = %self.root.display()))]
    pub fn publish_version(&self, id: &str, docs: &VersionDocuments) -> Result<PathBuf> {
        let target = self.version_dir(id).ok_or_else(|| RiskEngineError::invalid(id, "illegal version id"))?;
        if target.exists() {
            return Err(RiskEngineError::invalid(id, "version directory already exists"));
        }
        let staging = self.root.join(format!(".staging-{id}-{}", nonce()));
        fs::create_dir(&staging).map_err(|e| RiskEngineError::io(&staging, e))?;

        let written = write_documents(&staging, id, docs).and_then(|_| {
            fs::rename(&staging, &target).map_err(|e| RiskEngineError::io(&target, e))
        });
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        info!(version = %id, "published model version");
        Ok(target)
    }

    /// Bundle Loader entry point for a version of this registry.
    pub fn load(&self, id: &str) -> Result<LoadedModel> {
        let dir = self.version_dir(id).ok_or_else(|| RiskEngineError::VersionNotFound(id.to_string()))?;
        loader::load_version(&dir, id)
    }

    /// Non-hidden subdirectories, whether or not they are complete.
    fn version_like_dirs(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| RiskEngineError::io(&self.root, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RiskEngineError::io(&self.root, e))?;
            let Ok(name) = entry.file_name().into_string() else { continue };
            if name.starts_with('.') || !entry.path().is_dir() { continue; }
            ids.push(name);
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_documents(dir: &Path, id: &str, docs: &VersionDocuments) -> Result<()> {
    write_json(dir, BUNDLE_FILE, id, &docs.bundle)?;
    write_json(dir, VERSION_FILE, id, &docs.meta)?;
    write_json(dir, SCHEMA_FILE, id, &docs.schema)?;
    write_json(dir, METRICS_FILE, id, &docs.metrics)?;
    if let Some(card) = &docs.model_card {
        let path = dir.join(MODEL_CARD_FILE);
        fs::write(&path, card).map_err(|e| RiskEngineError::io(path, e))?;
    }
    Ok(())
}

fn write_json<T: Serialize>(dir: &Path, file: &str, id: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| RiskEngineError::invalid(id, format!("{file}: {e}")))?;
    let path = dir.join(file);
    fs::write(&path, bytes).map_err(|e| RiskEngineError::io(path, e))
}

fn is_complete_dir(dir: &Path) -> bool {
    dir.is_dir() && REQUIRED_FILES.iter().all(|f| dir.join(f).is_file())
}

/// Directory mtime, or `None` (logged) when it vanished or cannot be stat'ed mid-scan.
fn modified_time(dir: &Path) -> Option<SystemTime> {
    match fs::metadata(dir).and_then(|m| m.modified()) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping version directory with unreadable metadata");
            None
        }
    }
}

fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\'])
        && id != ACTIVE_POINTER_FILE
}

fn nonce() -> String {
    format!("{}-{:08x}", std::process::id(), rand::random::<u32>())
}
