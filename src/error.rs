//! Pipeline error type and its process exit codes

use crate::artifact::ConfigType;
use crate::qa::QaError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("path {path} escapes sandbox root {root}")]
    SandboxEscape { path: PathBuf, root: PathBuf },

    /// The artifact carries no config with this tag
    #[error("no config of type {0}")]
    NoSuchConfig(ConfigType),

    #[error("config of type {config_type} has unexpected shape: {reason}")]
    ConfigShape {
        config_type: ConfigType,
        reason: String,
    },

    #[error("transformer {name} uses unknown class {class}")]
    UnknownTransformerClass { name: String, class: String },

    #[error("transformation did not converge after {rounds} rounds")]
    TransformNotConverged { rounds: usize },

    #[error("artifact {name} of type {artifact_type} was emitted twice with different content")]
    DedupConflict { name: String, artifact_type: String },

    #[error("failed to render template {path}: {reason}")]
    TemplateRender { path: PathBuf, reason: String },

    #[error("cancelled by user")]
    Cancelled,

    #[error("transformer {transformer} failed during {operation} of {artifact}: {reason}")]
    Transformer {
        transformer: String,
        artifact: String,
        operation: String,
        reason: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transformer(
        transformer: impl Into<String>,
        artifact: impl Into<String>,
        operation: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        PipelineError::Transformer {
            transformer: transformer.into(),
            artifact: artifact.into(),
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::NoSuchConfig(_)
            | PipelineError::ConfigShape { .. }
            | PipelineError::UnknownTransformerClass { .. }
            | PipelineError::InvalidInput(_)
            | PipelineError::Io { .. } => 1,
            PipelineError::SandboxEscape { .. }
            | PipelineError::DedupConflict { .. }
            | PipelineError::TemplateRender { .. }
            | PipelineError::Transformer { .. } => 2,
            PipelineError::TransformNotConverged { .. } => 3,
            PipelineError::Cancelled => 130,
        }
    }

    /// Whether accumulated mappings should be written under `.partial/`
    pub fn emits_partial(&self) -> bool {
        matches!(
            self,
            PipelineError::TransformNotConverged { .. }
                | PipelineError::DedupConflict { .. }
                | PipelineError::TemplateRender { .. }
        )
    }

    /// Single line shown to the user; names the artifact, transformer and
    /// operation where known.
    pub fn diagnostic(&self) -> String {
        match self {
            PipelineError::Transformer {
                transformer,
                artifact,
                operation,
                reason,
            } => format!(
                "error: {} failed (transformer: {}, artifact: {}): {}",
                operation, transformer, artifact, reason
            ),
            PipelineError::DedupConflict {
                name,
                artifact_type,
            } => format!(
                "error: dedup (artifact: {} [{}]): conflicting payloads for the same key",
                name, artifact_type
            ),
            PipelineError::TransformNotConverged { rounds } => format!(
                "error: transform did not converge after {} rounds; partial output written under .partial/",
                rounds
            ),
            PipelineError::Cancelled => "cancelled".to_string(),
            other => format!("error: {}", other),
        }
    }
}

impl From<QaError> for PipelineError {
    fn from(e: QaError) -> Self {
        match e {
            QaError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::InvalidInput(other.to_string()),
        }
    }
}
