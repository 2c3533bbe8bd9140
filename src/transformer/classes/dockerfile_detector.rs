//! Services that already ship a Dockerfile

use super::{dockerfile_artifacts, image_name_of, DOCKERFILE_NAME, SOURCE_DIR};
use crate::artifact::{Artifact, ArtifactType, PathMapping, PathType, ServiceConfig};
use crate::error::PipelineError;
use crate::qa::common::port_for_service;
use crate::transformer::{image_name_compliant, DetectedServices, TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, warn};

fn expose_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*EXPOSE\s+(.+)$").expect("valid regex"))
}

/// Ports named by `EXPOSE` instructions, in order of appearance
pub(crate) fn exposed_ports(dockerfile: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for caps in expose_regex().captures_iter(dockerfile) {
        for token in caps[1].split_whitespace() {
            let number = token.split('/').next().unwrap_or(token);
            if let Ok(port) = number.parse::<u16>() {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    ports
}

pub struct DockerfileDetector;

#[async_trait]
impl Transformer for DockerfileDetector {
    async fn directory_detect(
        &self,
        config: &TransformerConfig,
        dir: &Path,
    ) -> Result<DetectedServices, PipelineError> {
        let mut services = DetectedServices::new();
        let dockerfile = dir.join(DOCKERFILE_NAME);
        if !dockerfile.is_file() {
            return Ok(services);
        }
        let name = dir
            .file_name()
            .map(|n| image_name_compliant(&n.to_string_lossy()))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| image_name_compliant(config.env.project_name()));
        services.insert(
            name.clone(),
            vec![Artifact::new(name, ArtifactType::SERVICE)
                .with_path(PathType::SERVICE_DIR, dir)
                .with_path(PathType::DOCKERFILE, dockerfile)],
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
            let dockerfile = artifact
                .first_path(PathType::DOCKERFILE)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.join(DOCKERFILE_NAME));
            let contents = match env.read_to_string(&dockerfile) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(transformer = %config.name(), artifact = %artifact.name, error = %e, "Unable to read Dockerfile");
                    continue;
                }
            };

            let mut ports = exposed_ports(&contents);
            if ports.is_empty() {
                let port = port_for_service(env.qa(), &artifact.name, &[])?;
                ports.push(port);
            }
            let image = image_name_of(artifact, &service.service_name);

            output.path_mappings.push(PathMapping::source(SOURCE_DIR));
            output.artifacts.extend(dockerfile_artifacts(
                artifact,
                &service,
                &image,
                dockerfile,
                Some(dir.to_path_buf()),
                &ports,
            ));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::artifact::ExposedPorts;
    use crate::qa::QuestionBridge;
    use crate::transformer::TransformerDescriptor;

    #[test]
    fn test_exposed_ports() {
        let df = "FROM nginx\nEXPOSE 80/tcp 443\n  expose 8080\nEXPOSE 80\n";
        assert_eq!(exposed_ports(df), vec![80, 443, 8080]);
        assert!(exposed_ports("FROM scratch\n").is_empty());
    }

    #[tokio::test]
    async fn test_detect_and_transform() {
        let h = Harness::new(
            TransformerDescriptor::new("Dockerfile", "DockerfileDetector"),
            QuestionBridge::with_defaults(),
            |src| {
                fs::create_dir_all(src.join("Gateway")).unwrap();
                fs::write(src.join("Gateway/Dockerfile"), "FROM nginx\nEXPOSE 80\n").unwrap();
            },
        );
        let mut t = DockerfileDetector;
        let found = t
            .directory_detect(&h.config, &h.source.path().join("Gateway"))
            .await
            .unwrap();
        assert!(found.contains_key("gateway"));

        let out = h.run(&mut t, &[h.service("gateway", "Gateway")], &[]).await;
        assert_eq!(out.artifacts.len(), 2);
        let dockerfile = &out.artifacts[0];
        assert_eq!(
            dockerfile.first_path(PathType::DOCKERFILE),
            Some(h.workspace.source().join("Gateway/Dockerfile").as_path())
        );
        assert_eq!(
            out.artifacts[1].config::<ExposedPorts>().unwrap().ports,
            vec![80]
        );
    }
}
