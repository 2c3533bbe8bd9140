//! Dockerfile generation for Node.js services

use super::{dockerfile_artifacts, image_name_of, ir_of, relative_to_source, DOCKERFILE_NAME, SOURCE_DIR};
use crate::artifact::{Artifact, PathMapping, PathType, ServiceConfig};
use crate::error::PipelineError;
use crate::qa::common::port_for_service;
use crate::transformer::{DetectedServices, TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

const DEFAULT_NODE_VERSION: &str = "12";
const PACKAGE_JSON: &str = "package.json";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodejsSettings {
    #[serde(default)]
    default_nodejs_version: String,
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    scripts: BTreeMap<String, String>,
    #[serde(default)]
    engines: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NodejsTemplateConfig {
    port: u16,
    build: bool,
    node_version: String,
}

#[derive(Debug, Default)]
pub struct NodejsDockerfileGenerator {
    default_version: String,
}

fn read_package_json(dir: &Path) -> Option<PackageJson> {
    let path = dir.join(PACKAGE_JSON);
    let contents = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(package) => Some(package),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Unable to parse package.json");
            None
        }
    }
}

/// Major version of an `engines.node` range such as `18.2.0`, `>=14` or `^v16`
fn node_major(range: &str) -> Option<String> {
    let start = range.find(|c: char| c.is_ascii_digit())?;
    let digits: String = range[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(digits)
}

/// Reads `KEY=value` pairs from a dotenv file
pub(crate) fn read_dotenv(path: &Path) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let Ok(contents) = fs::read_to_string(path) else {
        return vars;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    vars
}

#[async_trait]
impl Transformer for NodejsDockerfileGenerator {
    fn init(&mut self, config: &TransformerConfig) -> Result<(), PipelineError> {
        let settings: NodejsSettings = config.descriptor.config_as().map_err(|e| {
            PipelineError::transformer(config.name(), "-", "init", e)
        })?;
        self.default_version = if settings.default_nodejs_version.is_empty() {
            DEFAULT_NODE_VERSION.to_string()
        } else {
            settings.default_nodejs_version
        };
        Ok(())
    }

    async fn directory_detect(
        &self,
        _config: &TransformerConfig,
        dir: &Path,
    ) -> Result<DetectedServices, PipelineError> {
        let mut services = DetectedServices::new();
        let Some(package) = read_package_json(dir) else {
            return Ok(services);
        };
        if package.name.is_empty() {
            warn!(dir = %dir.display(), "Node.js service without a package name, ignoring");
            return Ok(services);
        }
        services.insert(
            package.name.clone(),
            vec![Artifact::new(&package.name, crate::artifact::ArtifactType::SERVICE)
                .with_path(PathType::SERVICE_DIR, dir)],
        );
        Ok(services)
    }

    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        _seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let mut output = TransformOutput::default();

        for artifact in new {
            env.check_cancelled()?;
            let Some(dir) = artifact.first_path(PathType::SERVICE_DIR) else {
                error!(transformer = %config.name(), artifact = %artifact.name, "Service has no directory");
                continue;
            };
            let service: ServiceConfig = match artifact.config() {
                Ok(service) => service,
                Err(e) => {
                    error!(transformer = %config.name(), artifact = %artifact.name, error = %e, "Missing service config");
                    continue;
                }
            };
            let rel = relative_to_source(env, dir).unwrap_or_default();
            let image = image_name_of(artifact, &service.service_name);

            let mut build = false;
            let mut node_version = self.default_version.clone();
            if let Some(package) = read_package_json(dir) {
                build = package.scripts.contains_key("build");
                if let Some(major) = package.engines.get("node").and_then(|r| node_major(r)) {
                    node_version = major;
                }
            }

            let mut ports = ir_of(artifact)
                .map(|ir| ir.services.values().flat_map(|s| s.container_ports()).collect::<Vec<_>>())
                .unwrap_or_default();
            if ports.is_empty() {
                if let Some(port) = read_dotenv(&dir.join(".env"))
                    .get("PORT")
                    .and_then(|p| p.trim().parse::<u16>().ok())
                {
                    ports.push(port);
                }
            }
            let port = port_for_service(env.qa(), &artifact.name, &ports)?;

            let dest = Path::new(SOURCE_DIR).join(&rel);
            output.path_mappings.push(PathMapping::source(SOURCE_DIR));
            output.path_mappings.push(
                PathMapping::template(
                    env.templates_dir(),
                    &dest,
                    &NodejsTemplateConfig {
                        port,
                        build,
                        node_version,
                    },
                )
                .map_err(|e| PipelineError::transformer(config.name(), &artifact.name, "transform", e))?,
            );

            let dockerfile: PathBuf = dest.join(DOCKERFILE_NAME);
            output
                .artifacts
                .extend(dockerfile_artifacts(artifact, &service, &image, dockerfile, None, &[port]));
        }

        Ok(output)
    }
}
