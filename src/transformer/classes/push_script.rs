//! Scripts that push every newly built image to the target registry

use super::SCRIPTS_DIR;
use crate::artifact::{Artifact, ArtifactType, NewImages, PathMapping, PathType};
use crate::error::PipelineError;
use crate::qa::common::{container_runtime, registry_namespace, registry_url};
use crate::transformer::{TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

pub const PUSH_SH_SCRIPT: &str = "pushimages.sh";
pub const PUSH_BAT_SCRIPT: &str = "pushimages.bat";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PushScriptConfig {
    #[serde(rename = "RegistryURL")]
    registry_url: String,
    registry_namespace: String,
    container_runtime: String,
    images: Vec<String>,
}

pub struct ContainerImagesPushScript;

#[async_trait]
impl Transformer for ContainerImagesPushScript {
    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let mut images = BTreeSet::new();
        for artifact in new
            .iter()
            .chain(seen.iter())
            .filter(|a| a.artifact_type == ArtifactType::NEW_IMAGES)
        {
            match artifact.config::<NewImages>() {
                Ok(new_images) => images.extend(new_images.image_names),
                Err(e) => debug!(artifact = %artifact.name, error = %e, "No new images config"),
            }
        }
        if images.is_empty() {
            return Ok(TransformOutput::default());
        }

        let values = PushScriptConfig {
            registry_url: registry_url(env.qa())?,
            registry_namespace: registry_namespace(env.qa(), env.project_name())?,
            container_runtime: container_runtime(env.qa())?,
            images: images.into_iter().collect(),
        };
        let scripts = Path::new(SCRIPTS_DIR);
        Ok(TransformOutput {
            path_mappings: vec![PathMapping::template(env.templates_dir(), SCRIPTS_DIR, &values)
                .map_err(|e| PipelineError::transformer(config.name(), "-", "transform", e))?],
            artifacts: vec![Artifact::new(
                ArtifactType::CONTAINER_IMAGES_PUSH_SCRIPT,
                ArtifactType::CONTAINER_IMAGES_PUSH_SCRIPT,
            )
            .with_path(PathType::PUSH_SH_SCRIPT, scripts.join(PUSH_SH_SCRIPT))
            .with_path(PathType::PUSH_BAT_SCRIPT, scripts.join(PUSH_BAT_SCRIPT))],
        })
    }
}
