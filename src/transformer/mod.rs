//! Transformer contract
//!
//! A transformer is a unit of work that consumes artifacts and produces new
//! artifacts plus deferred path mappings. Concrete implementations live in
//! [`classes`] and are looked up by the `class` field of their descriptor.
//!
//! Transformers never hold their own configuration: the registry owns a
//! [`TransformerConfig`] per instance and passes it to every call.

pub mod classes;
pub mod descriptor;
pub mod registry;

pub use descriptor::{TransformerDescriptor, TransformerSpec};
pub use registry::{ClassTable, LoadedTransformer, TransformerFactory, TransformerRegistry};

use crate::artifact::{Artifact, PathMapping};
use crate::environment::Environment;
use crate::error::PipelineError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

/// Descriptor and sandbox of one transformer instance
#[derive(Debug)]
pub struct TransformerConfig {
    pub descriptor: TransformerDescriptor,
    pub env: Environment,
}

impl TransformerConfig {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// What one `transform` call hands back to the engine
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransformOutput {
    pub path_mappings: Vec<PathMapping>,
    pub artifacts: Vec<Artifact>,
}

impl TransformOutput {
    pub fn is_empty(&self) -> bool {
        self.path_mappings.is_empty() && self.artifacts.is_empty()
    }
}

/// Services found in one directory, keyed by service name
pub type DetectedServices = BTreeMap<String, Vec<Artifact>>;

#[async_trait]
pub trait Transformer: Send + Sync {
    /// Called once after construction; a failure removes the transformer
    fn init(&mut self, config: &TransformerConfig) -> Result<(), PipelineError> {
        let _ = config;
        Ok(())
    }

    /// Reports services rooted at `dir`. Most transformers detect nothing.
    async fn directory_detect(
        &self,
        config: &TransformerConfig,
        dir: &Path,
    ) -> Result<DetectedServices, PipelineError> {
        let _ = (config, dir);
        Ok(DetectedServices::new())
    }

    /// Consumes `new` artifacts. `seen` holds every artifact of earlier
    /// rounds and of the current one.
    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError>;
}

/// Lowercases and strips characters not allowed in an image name
pub fn image_name_compliant(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches(|c| matches!(c, '.' | '_' | '-')).to_string()
}
