//! Container image build scripts for every Dockerfile seen so far

use super::{image_name_of, SCRIPTS_DIR, SOURCE_DIR};
use crate::artifact::{Artifact, ArtifactType, NewImages, PathMapping, PathType};
use crate::environment::paths::{normalize, unix_path, windows_path};
use crate::environment::PathClass;
use crate::error::PipelineError;
use crate::qa::common::container_runtime;
use crate::transformer::{TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BUILD_SH_SCRIPT: &str = "builddockerimages.sh";
pub const BUILD_BAT_SCRIPT: &str = "builddockerimages.bat";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BuildScriptEntry {
    dockerfile_name: String,
    image_name: String,
    context_unix: String,
    context_windows: String,
    container_runtime: String,
}

pub struct DockerfileImageBuildScript;

/// Build context of a Dockerfile, relative to the output root
fn build_context(config: &TransformerConfig, artifact: &Artifact, dockerfile: &Path) -> (PathBuf, String) {
    let env = &config.env;
    let context = artifact
        .first_path(PathType::DOCKERFILE_CONTEXT)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dockerfile.parent().map(Path::to_path_buf).unwrap_or_default());
    let dockerfile_name = dockerfile
        .strip_prefix(&context)
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_else(|_| {
            dockerfile
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

    if !context.is_absolute() {
        return (normalize(&context), dockerfile_name);
    }
    let rel = match env.relative(&context) {
        Some((PathClass::Source, rel)) => Path::new(SOURCE_DIR).join(rel),
        Some((PathClass::Output, rel)) => rel,
        _ => Path::new(SOURCE_DIR).join(context.file_name().unwrap_or_default()),
    };
    (rel, dockerfile_name)
}

#[async_trait]
impl Transformer for DockerfileImageBuildScript {
    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let mut output = TransformOutput::default();
        let mut entries = Vec::new();
        let mut processed = BTreeSet::new();

        let dockerfiles = new
            .iter()
            .chain(seen.iter())
            .filter(|a| a.artifact_type == ArtifactType::DOCKERFILE);
        for artifact in dockerfiles {
            let image = image_name_of(artifact, &artifact.name).image_name;
            if !processed.insert(image.clone()) {
                continue;
            }

            for dockerfile in artifact.paths_of(PathType::DOCKERFILE) {
                let (context, dockerfile_name) = build_context(config, artifact, dockerfile);
                let context = context.to_string_lossy().into_owned();
                debug!(image = %image, context = %context, "Adding image to build script");
                entries.push(BuildScriptEntry {
                    dockerfile_name: unix_path(&dockerfile_name),
                    image_name: image.clone(),
                    context_unix: unix_path(&context),
                    context_windows: windows_path(&context),
                    container_runtime: container_runtime(env.qa())?,
                });
                output.artifacts.push(
                    Artifact::new(env.project_name(), ArtifactType::NEW_IMAGES).with_config(NewImages {
                        image_names: vec![image.clone()],
                    }),
                );
            }
        }

        if entries.is_empty() {
            return Ok(TransformOutput::default());
        }

        output.path_mappings.push(
            PathMapping::template(env.templates_dir(), SCRIPTS_DIR, &entries)
                .map_err(|e| PipelineError::transformer(config.name(), "-", "transform", e))?,
        );
        let scripts = Path::new(SCRIPTS_DIR);
        output.artifacts.push(
            Artifact::new(
                ArtifactType::CONTAINER_IMAGE_BUILD_SCRIPT,
                ArtifactType::CONTAINER_IMAGE_BUILD_SCRIPT,
            )
            .with_path(PathType::BUILD_SH_SCRIPT, scripts.join(BUILD_SH_SCRIPT))
            .with_path(PathType::BUILD_SH_SCRIPT_CONTEXT, ".")
            .with_path(PathType::BUILD_BAT_SCRIPT, scripts.join(BUILD_BAT_SCRIPT))
            .with_path(PathType::BUILD_BAT_SCRIPT_CONTEXT, "."),
        );
        Ok(output)
    }
}
