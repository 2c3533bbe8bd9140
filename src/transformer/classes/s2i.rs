//! Source-to-image builds for services carrying S2I metadata

use super::{image_name_of, relative_to_source, SOURCE_DIR};
use crate::artifact::{
    Artifact, ArtifactType, NewImages, PathMapping, PathType, PlanConfig, S2IMetadataConfig,
    ServiceConfig,
};
use crate::error::PipelineError;
use crate::ir::{Container, ContainerPort, Ir, PortForwarding, Service};
use crate::qa::common::DEFAULT_SERVICE_PORT;
use crate::transformer::{
    image_name_compliant, DetectedServices, TransformOutput, Transformer, TransformerConfig,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error};

const S2I_DIR: &str = ".s2i";
pub const S2I_BUILD_SH_SCRIPT: &str = "s2ibuild.sh";
pub const S2I_BUILD_BAT_SCRIPT: &str = "s2ibuild.bat";
const DEFAULT_BUILDER: &str = "registry.access.redhat.com/ubi8/s2i-base";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2ISettings {
    #[serde(default)]
    default_builder: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct S2ITemplateConfig {
    image_name: String,
    builder: String,
    env_variables: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct S2IGenerator {
    default_builder: String,
}

fn s2i_metadata(artifact: &Artifact) -> S2IMetadataConfig {
    match artifact.config::<S2IMetadataConfig>() {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!(artifact = %artifact.name, error = %e, "No S2I metadata, using defaults");
            S2IMetadataConfig::default()
        }
    }
}

/// One service running the S2I-built image on the default port
fn s2i_ir(ir_name: &str, service_name: &str, image: &str) -> Ir {
    let mut ir = Ir::new(ir_name);
    let mut service = Service::new(service_name);
    service.containers.push(Container {
        name: service_name.to_string(),
        image: format!("{}:latest", image),
        new_image: true,
        ports: vec![ContainerPort::tcp(DEFAULT_SERVICE_PORT)],
        ..Default::default()
    });
    service
        .service_to_pod_port_forwardings
        .push(PortForwarding::new(DEFAULT_SERVICE_PORT, DEFAULT_SERVICE_PORT));
    ir.add_service(service);
    ir
}

#[async_trait]
impl Transformer for S2IGenerator {
    fn init(&mut self, config: &TransformerConfig) -> Result<(), PipelineError> {
        let settings: S2ISettings = config
            .descriptor
            .config_as()
            .map_err(|e| PipelineError::transformer(config.name(), "-", "init", e))?;
        self.default_builder = if settings.default_builder.is_empty() {
            DEFAULT_BUILDER.to_string()
        } else {
            settings.default_builder
        };
        Ok(())
    }

    async fn directory_detect(
        &self,
        _config: &TransformerConfig,
        dir: &Path,
    ) -> Result<DetectedServices, PipelineError> {
        let mut services = DetectedServices::new();
        if !dir.join(S2I_DIR).is_dir() {
            return Ok(services);
        }
        let name = dir
            .file_name()
            .map(|n| image_name_compliant(&n.to_string_lossy()))
            .unwrap_or_default();
        if name.is_empty() {
            return Ok(services);
        }
        debug!(dir = %dir.display(), service = %name, "Found S2I service");
        services.insert(
            name.clone(),
            vec![Artifact::new(&name, ArtifactType::SERVICE)
                .with_path(PathType::SERVICE_DIR, dir)
                .with_config(S2IMetadataConfig::default())],
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
            let service: ServiceConfig = match artifact.config() {
                Ok(service) => service,
                Err(e) => {
                    error!(transformer = %config.name(), artifact = %artifact.name, error = %e, "Missing service config");
                    continue;
                }
            };
            let Some(dir) = artifact.first_path(PathType::SERVICE_DIR) else {
                error!(transformer = %config.name(), artifact = %artifact.name, "Service has no directory");
                continue;
            };
            let Some(rel) = relative_to_source(env, dir) else {
                error!(transformer = %config.name(), artifact = %artifact.name, dir = %dir.display(), "Service directory is outside the source tree");
                continue;
            };

            let mut metadata = s2i_metadata(artifact);
            if metadata.image_name.is_empty() {
                metadata.image_name = image_name_of(artifact, &service.service_name).image_name;
            }
            if metadata.builder.is_empty() {
                metadata.builder = self.default_builder.clone();
            }
            let image = metadata.image_name.clone();
            let ir_name = match artifact.config::<PlanConfig>() {
                Ok(plan) if !plan.plan_name.is_empty() => plan.plan_name,
                _ => env.project_name().to_string(),
            };

            let dest = Path::new(SOURCE_DIR).join(&rel);
            output.path_mappings.push(PathMapping::source(SOURCE_DIR));
            output.path_mappings.push(
                PathMapping::template(
                    env.templates_dir(),
                    &dest,
                    &S2ITemplateConfig {
                        image_name: image.clone(),
                        builder: metadata.builder,
                        env_variables: metadata.env_variables,
                    },
                )
                .map_err(|e| PipelineError::transformer(config.name(), &artifact.name, "transform", e))?,
            );

            output.artifacts.push(
                Artifact::new(&service.service_name, ArtifactType::IR)
                    .with_config(s2i_ir(&ir_name, &service.service_name, &image)),
            );
            output.artifacts.push(
                Artifact::new(&image, ArtifactType::NEW_IMAGES).with_config(NewImages {
                    image_names: vec![image.clone()],
                }),
            );
            output.artifacts.push(
                Artifact::new(&image, ArtifactType::CONTAINER_IMAGE_BUILD_SCRIPT)
                    .with_path(PathType::BUILD_SH_SCRIPT, dest.join(S2I_BUILD_SH_SCRIPT))
                    .with_path(PathType::BUILD_SH_SCRIPT_CONTEXT, &dest)
                    .with_path(PathType::BUILD_BAT_SCRIPT, dest.join(S2I_BUILD_BAT_SCRIPT))
                    .with_path(PathType::BUILD_BAT_SCRIPT_CONTEXT, &dest),
            );
        }

        Ok(output)
    }
}
