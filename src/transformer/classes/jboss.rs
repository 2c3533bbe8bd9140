//! JBoss/WildFly Dockerfiles for WAR and EAR deployments

use super::{dockerfile_artifacts, image_name_of, relative_to_source, DOCKERFILE_NAME, SOURCE_DIR};
use crate::artifact::{
    Artifact, EarArtifactConfig, PathMapping, PathType, ServiceConfig, WarArtifactConfig,
};
use crate::error::PipelineError;
use crate::transformer::{TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

const DEFAULT_JBOSS_PORT: u16 = 8080;
const DEFAULT_JAVA_PACKAGE: &str = "java-17-openjdk";
const VERSION_MAPPING_FILE: &str = "mappings/javapackageversions.yaml";
const RUN_TEMPLATE: &str = "Dockerfile.jboss";
const LICENSE_TEMPLATE: &str = "Dockerfile.license";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JbossSettings {
    #[serde(default)]
    default_java_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JavaPackageVersions {
    spec: JavaPackageVersionsSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JavaPackageVersionsSpec {
    #[serde(default)]
    package_versions: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct JbossDockerfileTemplate {
    java_package_name: String,
    deployment_file: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    build_container_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    deployment_file_dir_in_build_container: String,
    port: u16,
    env_variables: BTreeMap<String, String>,
}

/// Deployment fields shared by WAR and EAR configs
struct Deployment {
    deployment_file: String,
    java_version: String,
    build_container_name: String,
    deployment_file_dir_in_build_container: String,
    env_variables: BTreeMap<String, String>,
}

impl From<WarArtifactConfig> for Deployment {
    fn from(c: WarArtifactConfig) -> Self {
        Self {
            deployment_file: c.deployment_file,
            java_version: c.java_version,
            build_container_name: c.build_container_name,
            deployment_file_dir_in_build_container: c.deployment_file_dir_in_build_container,
            env_variables: c.env_variables,
        }
    }
}

impl From<EarArtifactConfig> for Deployment {
    fn from(c: EarArtifactConfig) -> Self {
        Self {
            deployment_file: c.deployment_file,
            java_version: c.java_version,
            build_container_name: c.build_container_name,
            deployment_file_dir_in_build_container: c.deployment_file_dir_in_build_container,
            env_variables: c.env_variables,
        }
    }
}

/// WAR config first, then EAR
fn deployment_of(artifact: &Artifact) -> Option<Deployment> {
    match artifact.config::<WarArtifactConfig>() {
        Ok(war) => return Some(war.into()),
        Err(e) => debug!(artifact = %artifact.name, error = %e, "No WAR config, trying EAR"),
    }
    match artifact.config::<EarArtifactConfig>() {
        Ok(ear) => Some(ear.into()),
        Err(e) => {
            debug!(artifact = %artifact.name, error = %e, "No EAR config");
            None
        }
    }
}

/// Package name for a Java version from the bundled mapping file
fn java_package(mapping_file: &Path, java_version: &str) -> Result<String, PipelineError> {
    let contents = fs::read_to_string(mapping_file).map_err(|e| PipelineError::io(mapping_file, e))?;
    let mapping: JavaPackageVersions = serde_yaml::from_str(&contents)
        .map_err(|e| PipelineError::InvalidInput(format!("{}: {}", mapping_file.display(), e)))?;
    mapping
        .spec
        .package_versions
        .get(java_version)
        .cloned()
        .ok_or_else(|| PipelineError::InvalidInput(format!("no Java package for version {}", java_version)))
}

#[derive(Debug, Default)]
pub struct Jboss {
    java_version: String,
}

#[async_trait]
impl Transformer for Jboss {
    fn init(&mut self, config: &TransformerConfig) -> Result<(), PipelineError> {
        let settings: JbossSettings = config
            .descriptor
            .config_as()
            .map_err(|e| PipelineError::transformer(config.name(), "-", "init", e))?;
        self.java_version = settings.default_java_version;
        Ok(())
    }

    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        _seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let templates = env.templates_dir();
        let mut output = TransformOutput::default();

        for artifact in new {
            env.check_cancelled()?;
            let service: ServiceConfig = match artifact.config() {
                Ok(service) => service,
                Err(e) => {
                    error!(transformer = %config.name(), artifact = %artifact.name, error = %e, "Missing service config");
                    continue;
                }
            };
            let Some(deployment) = deployment_of(artifact) else {
                error!(transformer = %config.name(), artifact = %artifact.name, "Artifact has neither WAR nor EAR config");
                continue;
            };
            let image = image_name_of(artifact, &service.service_name);
            let rel = artifact
                .first_path(PathType::SERVICE_DIR)
                .and_then(|dir| relative_to_source(env, dir))
                .unwrap_or_default();

            let run = match fs::read_to_string(templates.join(RUN_TEMPLATE)) {
                Ok(run) => run,
                Err(e) => {
                    error!(transformer = %config.name(), error = %e, "Unable to read the JBoss Dockerfile template");
                    continue;
                }
            };
            let build_container = artifact.first_path(PathType::BUILD_CONTAINER_FILE);
            let head = match build_container {
                Some(path) => match env.read_to_string(path) {
                    Ok(head) => head,
                    Err(e) => {
                        error!(transformer = %config.name(), artifact = %artifact.name, error = %e, "Unable to read the build container Dockerfile");
                        continue;
                    }
                },
                None => fs::read_to_string(templates.join(LICENSE_TEMPLATE)).unwrap_or_else(|e| {
                    error!(transformer = %config.name(), error = %e, "Unable to read the Dockerfile license header");
                    String::new()
                }),
            };
            let template_file = env.write_temp(
                &Path::new(&artifact.name).join(DOCKERFILE_NAME),
                format!("{}\n{}", head, run),
            )?;

            let java_version = if deployment.java_version.is_empty() {
                self.java_version.clone()
            } else {
                deployment.java_version.clone()
            };
            let java_package_name = java_package(&env.context().join(VERSION_MAPPING_FILE), &java_version)
                .unwrap_or_else(|e| {
                    error!(transformer = %config.name(), java_version = %java_version, error = %e, "Unable to map Java version");
                    DEFAULT_JAVA_PACKAGE.to_string()
                });

            let mut values = JbossDockerfileTemplate {
                java_package_name,
                deployment_file: deployment.deployment_file,
                port: DEFAULT_JBOSS_PORT,
                env_variables: deployment.env_variables,
                ..Default::default()
            };
            if build_container.is_some() {
                values.build_container_name = deployment.build_container_name;
                values.deployment_file_dir_in_build_container =
                    deployment.deployment_file_dir_in_build_container;
            }

            let dockerfile: PathBuf = Path::new(SOURCE_DIR).join(&rel).join(DOCKERFILE_NAME);
            output.path_mappings.push(PathMapping::source(SOURCE_DIR));
            output.path_mappings.push(
                PathMapping::template(&template_file, &dockerfile, &values).map_err(|e| {
                    PipelineError::transformer(config.name(), &artifact.name, "transform", e)
                })?,
            );
            output.artifacts.extend(dockerfile_artifacts(
                artifact,
                &service,
                &image,
                dockerfile,
                None,
                &[DEFAULT_JBOSS_PORT],
            ));
        }

        Ok(output)
    }
}
