//! Transformer descriptor files
//!
//! ```yaml
//! kind: Transformer
//! name: Nodejs
//! class: NodejsDockerfileGenerator
//! spec:
//!   templatesDir: templates
//!   consumes: [Service]
//!   produces: [Dockerfile, DockerfileForService]
//!   priority: 10
//!   config:
//!     defaultNodejsVersion: "12"
//! ```

use crate::artifact::ArtifactType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const DESCRIPTOR_KIND: &str = "Transformer";
pub const DESCRIPTOR_FILE: &str = "transformer.yaml";

fn default_kind() -> String {
    DESCRIPTOR_KIND.to_string()
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerSpec {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    #[serde(default)]
    pub consumes: Vec<ArtifactType>,

    #[serde(default)]
    pub produces: Vec<ArtifactType>,

    /// Receive every artifact regardless of type
    #[serde(default)]
    pub accepts_all: bool,

    /// Higher runs first within a round
    #[serde(default)]
    pub priority: i32,

    /// Class-specific settings
    #[serde(default)]
    pub config: serde_json::Value,

    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl Default for TransformerSpec {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            consumes: Vec::new(),
            produces: Vec::new(),
            accepts_all: false,
            priority: 0,
            config: serde_json::Value::Null,
            unknown: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerDescriptor {
    #[serde(default = "default_kind")]
    pub kind: String,

    pub name: String,

    pub class: String,

    #[serde(default)]
    pub spec: TransformerSpec,

    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_json::Value>,

    /// Directory holding the descriptor; the transformer's context root
    #[serde(skip)]
    pub dir: PathBuf,
}

impl TransformerDescriptor {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            kind: default_kind(),
            name: name.into(),
            class: class.into(),
            spec: TransformerSpec::default(),
            unknown: BTreeMap::new(),
            dir: PathBuf::new(),
        }
    }

    pub fn consumes(&self, artifact_type: &ArtifactType) -> bool {
        self.spec.accepts_all || self.spec.consumes.contains(artifact_type)
    }

    /// Reads a string setting from `spec.config`
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.spec.config.get(key).and_then(|v| v.as_str())
    }

    /// Deserializes `spec.config` into a class-specific settings struct
    pub fn config_as<T: serde::de::DeserializeOwned + Default>(&self) -> Result<T, serde_json::Error> {
        if self.spec.config.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.spec.config.clone())
    }

    pub fn parse(contents: &str, path: &Path) -> Result<Self> {
        let mut descriptor: TransformerDescriptor = serde_yaml::from_str(contents)
            .with_context(|| format!("Failed to parse transformer descriptor: {}", path.display()))?;
        descriptor.dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        for key in descriptor.unknown.keys() {
            warn!(descriptor = %path.display(), field = %key, "Unknown descriptor field");
        }
        for key in descriptor.spec.unknown.keys() {
            warn!(descriptor = %path.display(), field = %format!("spec.{}", key), "Unknown descriptor field");
        }
        Ok(descriptor)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Finds every `kind: Transformer` YAML file under the given directories.
///
/// Files of other kinds are ignored; unparsable descriptors are skipped with
/// a warning. When two descriptors share a name the first one found wins.
pub fn discover(dirs: &[PathBuf]) -> Vec<TransformerDescriptor> {
    let mut found: Vec<TransformerDescriptor> = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Transformer directory does not exist");
            continue;
        }

        for entry in WalkDir::new(dir).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || !is_yaml(path) {
                continue;
            }
            // Templates are rendered later, never descriptors
            if path.components().any(|c| c.as_os_str() == "templates") {
                continue;
            }

            let contents = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read YAML file");
                    continue;
                }
            };
            let kind = serde_yaml::from_str::<serde_yaml::Value>(&contents)
                .ok()
                .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(str::to_string));
            if kind.as_deref() != Some(DESCRIPTOR_KIND) {
                continue;
            }

            match TransformerDescriptor::parse(&contents, path) {
                Ok(descriptor) => {
                    if found.iter().any(|d| d.name == descriptor.name) {
                        warn!(name = %descriptor.name, path = %path.display(), "Duplicate transformer name, ignoring");
                        continue;
                    }
                    debug!(name = %descriptor.name, class = %descriptor.class, "Found transformer descriptor");
                    found.push(descriptor);
                }
                Err(e) => warn!(error = %format!("{:#}", e), "Skipping transformer descriptor"),
            }
        }
    }

    found
}
