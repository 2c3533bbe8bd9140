//! Top-level README describing what was generated

use crate::artifact::{Artifact, ArtifactType, PathMapping, ServiceConfig};
use crate::error::PipelineError;
use crate::transformer::{TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReadMeConfig {
    project_name: String,
    services: Vec<String>,
    images: Vec<String>,
    build_scripts: bool,
    push_scripts: bool,
    manifests: bool,
}

pub struct ReadMeGenerator;

fn summarize(project: &str, artifacts: &[&Artifact]) -> ReadMeConfig {
    let mut services = BTreeSet::new();
    let mut images = BTreeSet::new();
    let mut config = ReadMeConfig {
        project_name: project.to_string(),
        ..Default::default()
    };
    for artifact in artifacts {
        match artifact.artifact_type.as_str() {
            ArtifactType::SERVICE => {
                let name = artifact
                    .config::<ServiceConfig>()
                    .map(|s| s.service_name)
                    .unwrap_or_else(|_| artifact.name.clone());
                services.insert(name);
            }
            ArtifactType::DOCKERFILE => {
                images.insert(artifact.name.clone());
            }
            ArtifactType::CONTAINER_IMAGE_BUILD_SCRIPT => config.build_scripts = true,
            ArtifactType::CONTAINER_IMAGES_PUSH_SCRIPT => config.push_scripts = true,
            ArtifactType::KUBERNETES_YAMLS => config.manifests = true,
            _ => {}
        }
    }
    config.services = services.into_iter().collect();
    config.images = images.into_iter().collect();
    config
}

#[async_trait]
impl Transformer for ReadMeGenerator {
    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let all: Vec<&Artifact> = new.iter().chain(seen.iter()).collect();
        let values = summarize(env.project_name(), &all);
        Ok(TransformOutput {
            path_mappings: vec![PathMapping::template(env.templates_dir(), "", &values)
                .map_err(|e| PipelineError::transformer(config.name(), "-", "transform", e))?],
            artifacts: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::qa::QuestionBridge;
    use crate::transformer::TransformerDescriptor;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_summarizes_new_and_seen() {
        let h = Harness::new(
            TransformerDescriptor::new("ReadMeGenerator", "ReadMeGenerator"),
            QuestionBridge::with_defaults(),
            |_| {},
        );
        let seen = vec![
            h.service("api", "api"),
            Artifact::new("api", ArtifactType::DOCKERFILE),
        ];
        let new = vec![Artifact::new("proj", ArtifactType::KUBERNETES_YAMLS)];
        let mut t = ReadMeGenerator;
        let out = h.run(&mut t, &new, &seen).await;

        assert!(out.artifacts.is_empty());
        let mapping = &out.path_mappings[0];
        assert_eq!(mapping.dest_path, PathBuf::new());
        let cfg = mapping.template_config.as_ref().unwrap();
        assert_eq!(cfg["ProjectName"], "proj");
        assert_eq!(cfg["Services"], serde_json::json!(["api"]));
        assert_eq!(cfg["Manifests"], true);
        assert_eq!(cfg["BuildScripts"], false);
    }
}
