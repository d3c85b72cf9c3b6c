//! Error taxonomy for the registry, loader and scoring paths.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RiskEngineError>;

#[derive(Debug, Error)]
pub enum RiskEngineError {
    #[error("unusable artifacts root {path}: {reason}")]
    Configuration { path: PathBuf, reason: String },

    #[error("requested model version not found: {0}")]
    VersionNotFound(String),

    #[error("invalid artifact {version}: {reason}")]
    InvalidArtifact { version: String, reason: String },

    #[error("no usable feature columns for {version}: {reason}")]
    SchemaResolution { version: String, reason: String },

    #[error("feature schema mismatch: missing={missing:?} extra={extra:?}")]
    SchemaMismatch { missing: Vec<String>, extra: Vec<String> },

    #[error("invalid value for feature {feature}: {reason}")]
    InvalidFeatureValue { feature: String, reason: String },

    #[error("artifact registry at {0} has no valid model versions")]
    EmptyRegistry(PathBuf),

    #[error("predictor produced a non-finite score: {0}")]
    Inference(f64),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RiskEngineError {
    pub(crate) fn invalid(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArtifact { version: version.into(), reason: reason.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Stable identifier for transports and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::VersionNotFound(_) => "version_not_found",
            Self::InvalidArtifact { .. } => "invalid_artifact",
            Self::SchemaResolution { .. } => "schema_resolution_error",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::InvalidFeatureValue { .. } => "invalid_feature_value",
            Self::EmptyRegistry(_) => "empty_registry",
            Self::Inference(_) => "inference_error",
            Self::Io { .. } => "io_error",
        }
    }

    /// True for rejections caused by the request itself rather than the served model.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. } | Self::InvalidFeatureValue { .. })
    }
}
