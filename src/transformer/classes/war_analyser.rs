//! Detects prebuilt Java web archives

use crate::artifact::{
    Artifact, ArtifactType, EarArtifactConfig, PathType, ServiceConfig, WarArtifactConfig,
};
use crate::error::PipelineError;
use crate::transformer::{image_name_compliant, DetectedServices, TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, error};

const DEFAULT_JAVA_VERSION: &str = "17";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WarSettings {
    #[serde(default)]
    default_java_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    War,
    Ear,
}

fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "war" => Some(ArchiveKind::War),
        "ear" => Some(ArchiveKind::Ear),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct WarAnalyser {
    java_version: String,
}

#[async_trait]
impl Transformer for WarAnalyser {
    fn init(&mut self, config: &TransformerConfig) -> Result<(), PipelineError> {
        let settings: WarSettings = config
            .descriptor
            .config_as()
            .map_err(|e| PipelineError::transformer(config.name(), "-", "init", e))?;
        self.java_version = if settings.default_java_version.is_empty() {
            DEFAULT_JAVA_VERSION.to_string()
        } else {
            settings.default_java_version
        };
        Ok(())
    }

    async fn directory_detect(
        &self,
        _config: &TransformerConfig,
        dir: &Path,
    ) -> Result<DetectedServices, PipelineError> {
        let mut services = DetectedServices::new();
        let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
        let mut archives: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && archive_kind(p).is_some())
            .collect();
        archives.sort();

        for archive in archives {
            let Some(stem) = archive.file_stem().map(|s| image_name_compliant(&s.to_string_lossy())) else {
                continue;
            };
            if stem.is_empty() {
                continue;
            }
            debug!(archive = %archive.display(), service = %stem, "Found Java archive");
            services.entry(stem.clone()).or_default().push(
                Artifact::new(stem, ArtifactType::SERVICE)
                    .with_path(PathType::SERVICE_DIR, dir)
                    .with_path(PathType::DEPLOYMENT_FILE, &archive),
            );
        }
        Ok(services)
    }

    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        _seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let mut output = TransformOutput::default();

        for artifact in new {
            config.env.check_cancelled()?;
            let service: ServiceConfig = match artifact.config() {
                Ok(service) => service,
                Err(e) => {
                    error!(transformer = %config.name(), artifact = %artifact.name, error = %e, "Missing service config");
                    continue;
                }
            };
            let Some(archive) = artifact.first_path(PathType::DEPLOYMENT_FILE) else {
                error!(transformer = %config.name(), artifact = %artifact.name, "Service has no deployment file");
                continue;
            };
            let deployment_file = archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut produced = match archive_kind(archive) {
                Some(ArchiveKind::War) => {
                    Artifact::new(&service.service_name, ArtifactType::WAR).with_config(WarArtifactConfig {
                        deployment_file,
                        java_version: self.java_version.clone(),
                        ..Default::default()
                    })
                }
                Some(ArchiveKind::Ear) => {
                    Artifact::new(&service.service_name, ArtifactType::EAR).with_config(EarArtifactConfig {
                        deployment_file,
                        java_version: self.java_version.clone(),
                        ..Default::default()
                    })
                }
                None => {
                    error!(transformer = %config.name(), artifact = %artifact.name, "Deployment file is not a WAR or EAR");
                    continue;
                }
            };
            produced.paths = artifact.paths.clone();
            produced.configs.merge_missing(&artifact.configs);
            output.artifacts.push(produced);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::qa::QuestionBridge;
    use crate::transformer::TransformerDescriptor;

    fn harness() -> Harness {
        Harness::new(
            TransformerDescriptor::new("WarAnalyser", "WarAnalyser"),
            QuestionBridge::with_defaults(),
            |src| {
                fs::create_dir_all(src.join("deploy")).unwrap();
                fs::write(src.join("deploy/Demo.war"), b"PK").unwrap();
                fs::write(src.join("deploy/shop.ear"), b"PK").unwrap();
                fs::write(src.join("deploy/readme.txt"), "x").unwrap();
            },
        )
    }

    #[tokio::test]
    async fn test_detects_archives() {
        let h = harness();
        let found = WarAnalyser::default()
            .directory_detect(&h.config, &h.source.path().join("deploy"))
            .await
            .unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["demo", "shop"]);
    }

    #[tokio::test]
    async fn test_transform_produces_war_and_ear() {
        let h = harness();
        let war = h
            .service("demo", "deploy")
            .with_path(PathType::DEPLOYMENT_FILE, h.workspace.source().join("deploy/Demo.war"));
        let ear = h
            .service("shop", "deploy")
            .with_path(PathType::DEPLOYMENT_FILE, h.workspace.source().join("deploy/shop.ear"));
        let mut t = WarAnalyser::default();
        let out = h.run(&mut t, &[war, ear], &[]).await;

        assert_eq!(out.artifacts.len(), 2);
        assert_eq!(out.artifacts[0].artifact_type, ArtifactType::WAR);
        let cfg: WarArtifactConfig = out.artifacts[0].config().unwrap();
        assert_eq!(cfg.deployment_file, "Demo.war");
        assert_eq!(cfg.java_version, "17");
        assert!(out.artifacts[0].config::<ServiceConfig>().is_ok());
        assert_eq!(out.artifacts[1].artifact_type, ArtifactType::EAR);
    }
}
