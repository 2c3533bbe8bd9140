//! Plan document
//!
//! A plan is the frozen outcome of discovery: which transformer handles
//! which service, and the paths it was detected at. Paths inside the root
//! directory are stored relative to it so a plan can be moved along with the
//! source tree.
//!
//! ```yaml
//! apiVersion: kubelift.io/v1alpha1
//! kind: Plan
//! name: shop
//! rootDir: /home/me/shop
//! services:
//!   web:
//!     transformer: NodejsDockerfileGenerator
//!     paths:
//!       ServiceDirectories: [web]
//! configuration:
//!   transformerDirs: []
//! ```

mod builder;

pub use builder::{Candidate, Candidates, PlanBuilder, COLLECT_DIR, COLLECT_FILE};

use crate::artifact::{Artifact, ArtifactType, Configs, PathType, PlanConfig, ServiceConfig};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PLAN_API_VERSION: &str = "kubelift.io/v1alpha1";
pub const PLAN_KIND: &str = "Plan";
pub const DEFAULT_PLAN_FILE: &str = "kubelift.plan";

fn default_api_version() -> String {
    PLAN_API_VERSION.to_string()
}

fn default_kind() -> String {
    PLAN_KIND.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub name: String,

    pub root_dir: PathBuf,

    #[serde(default)]
    pub services: BTreeMap<String, PlanService>,

    #[serde(default)]
    pub configuration: PlanConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanService {
    pub transformer: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<PathType, Vec<PathBuf>>,

    #[serde(default, skip_serializing_if = "Configs::is_empty")]
    pub config: Configs,
}

/// Settings that apply to the whole transform run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfiguration {
    /// Extra descriptor directories searched in addition to the built-in one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformer_dirs: Vec<PathBuf>,

    /// Fields this version does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `path` relative to `root` when it lies inside it
pub(crate) fn relativize(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

fn resolve(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if path == Path::new(".") {
        root.to_path_buf()
    } else {
        root.join(path)
    }
}

impl Plan {
    pub fn new(name: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            name: name.into(),
            root_dir: root_dir.into(),
            services: BTreeMap::new(),
            configuration: PlanConfiguration::default(),
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, PipelineError> {
        let plan: Plan = serde_yaml::from_str(contents)
            .map_err(|e| PipelineError::InvalidInput(format!("malformed plan: {}", e)))?;
        if plan.kind != PLAN_KIND {
            return Err(PipelineError::InvalidInput(format!(
                "expected a document of kind {}, found {}",
                PLAN_KIND, plan.kind
            )));
        }
        Ok(plan)
    }

    pub fn to_yaml(&self) -> Result<String, PipelineError> {
        serde_yaml::to_string(self).map_err(|e| PipelineError::InvalidInput(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let plan = Self::from_yaml(&contents)?;
        debug!(path = %path.display(), services = plan.services.len(), "Plan loaded");
        Ok(plan)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        fs::write(path, self.to_yaml()?).map_err(|e| PipelineError::io(path, e))
    }

    /// Names of the transformers the plan's services are assigned to
    pub fn selected_transformers(&self) -> BTreeSet<String> {
        self.services.values().map(|s| s.transformer.clone()).collect()
    }

    /// One `Service` artifact per planned service, routed to its selected
    /// transformer. Relative paths resolve against `source`, which is
    /// normally the snapshot of `root_dir`.
    pub fn seed_artifacts(&self, source: &Path) -> Vec<Artifact> {
        self.services
            .iter()
            .map(|(name, service)| {
                let mut artifact =
                    Artifact::new(name, ArtifactType::SERVICE).process_with(&service.transformer);
                for (path_type, paths) in &service.paths {
                    artifact.set_paths(
                        path_type.as_str(),
                        paths.iter().map(|p| resolve(p, source)).collect(),
                    );
                }
                artifact.configs = service.config.clone();
                artifact.set_config(ServiceConfig {
                    service_name: name.clone(),
                });
                artifact.set_config(PlanConfig {
                    plan_name: self.name.clone(),
                });
                artifact
            })
            .collect()
    }
}
