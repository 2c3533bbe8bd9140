//! Discovery walk that turns a source tree into a plan
//!
//! Directories are visited breadth first. Every loaded transformer gets a
//! chance to claim each directory through `directory_detect`; once a
//! directory yields a service its subtree is not visited again. Hidden
//! directories, `.gitignore` entries and entries of the configured ignore
//! file are skipped.

use super::{relativize, Plan, PlanService};
use crate::artifact::{Artifact, Configs, PathType};
use crate::error::PipelineError;
use crate::qa::common::quote;
use crate::qa::QuestionBridge;
use crate::transformer::TransformerRegistry;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const COLLECT_DIR: &str = "collect";
pub const COLLECT_FILE: &str = "services.yaml";

/// One transformer's claim on a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub transformer: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<PathType, Vec<PathBuf>>,

    #[serde(default, skip_serializing_if = "Configs::is_empty")]
    pub config: Configs,
}

impl Candidate {
    fn absorb(&mut self, artifact: &Artifact, root: &Path) {
        for (path_type, paths) in &artifact.paths {
            let entry = self.paths.entry(path_type.clone()).or_default();
            for path in paths {
                let rel = relativize(path, root);
                if !entry.contains(&rel) {
                    entry.push(rel);
                }
            }
        }
        self.config.merge_missing(&artifact.configs);
    }
}

/// Every claim per service name, in transformer invocation order
pub type Candidates = BTreeMap<String, Vec<Candidate>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectedServices<'a> {
    kind: &'static str,
    root_dir: &'a Path,
    services: &'a Candidates,
}

pub struct PlanBuilder<'a> {
    registry: &'a TransformerRegistry,
    qa: &'a QuestionBridge,
    ignore_file_name: String,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(registry: &'a TransformerRegistry, qa: &'a QuestionBridge) -> Self {
        Self {
            registry,
            qa,
            ignore_file_name: crate::config::DEFAULT_IGNORE_FILE.to_string(),
        }
    }

    pub fn with_ignore_file(mut self, name: impl Into<String>) -> Self {
        self.ignore_file_name = name.into();
        self
    }

    /// Directories under `root` in breadth-first order
    fn directories(&self, root: &Path) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .add_custom_ignore_filename(&self.ignore_file_name)
            .build();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "Failed to read directory entry");
                    continue;
                }
            };
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(entry.into_path());
            }
        }
        dirs.sort_by(|a, b| {
            a.components()
                .count()
                .cmp(&b.components().count())
                .then_with(|| a.cmp(b))
        });
        dirs
    }

    /// Runs every transformer's detection over the tree
    pub async fn detect(&self, root: &Path) -> Result<Candidates, PipelineError> {
        let root = root.canonicalize().map_err(|e| PipelineError::io(root, e))?;
        let mut candidates = Candidates::new();
        let mut claimed: Vec<PathBuf> = Vec::new();

        for dir in self.directories(&root) {
            if claimed.iter().any(|c| dir.starts_with(c)) {
                continue;
            }
            let mut dir_claimed = false;
            for transformer in self.registry.iter() {
                if self.qa.cancel_token().is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                let detected = match transformer.directory_detect(&dir).await {
                    Ok(detected) => detected,
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e) => {
                        error!(transformer = %transformer.name(), dir = %dir.display(), error = %e, "Directory detection failed");
                        continue;
                    }
                };
                for (service, artifacts) in detected {
                    if service.trim().is_empty() {
                        warn!(transformer = %transformer.name(), dir = %dir.display(), "Dropping service detected without a name");
                        continue;
                    }
                    debug!(transformer = %transformer.name(), service = %service, dir = %dir.display(), "Service detected");
                    let claims = candidates.entry(service).or_default();
                    let index = match claims.iter().position(|c| c.transformer == transformer.name()) {
                        Some(index) => index,
                        None => {
                            claims.push(Candidate {
                                transformer: transformer.name().to_string(),
                                paths: BTreeMap::new(),
                                config: Configs::default(),
                            });
                            claims.len() - 1
                        }
                    };
                    for artifact in &artifacts {
                        claims[index].absorb(artifact, &root);
                    }
                    dir_claimed = true;
                }
            }
            if dir_claimed {
                claimed.push(dir);
            }
        }

        info!(services = candidates.len(), "Service detection completed");
        Ok(candidates)
    }

    /// Detects services and settles each one on a single transformer,
    /// asking when more than one claims it
    pub async fn build(&self, name: &str, root: &Path) -> Result<Plan, PipelineError> {
        let root_dir = root.canonicalize().map_err(|e| PipelineError::io(root, e))?;
        let candidates = self.detect(&root_dir).await?;
        let mut plan = Plan::new(name, &root_dir);

        for (service, claims) in candidates {
            let Some(first) = claims.first() else {
                continue;
            };
            let chosen = if claims.len() == 1 {
                first.clone()
            } else {
                let options: Vec<&str> = claims.iter().map(|c| c.transformer.as_str()).collect();
                let answer = self.qa.fetch_select(
                    &format!("plan.services.{}.transformer", quote(&service)),
                    &format!("Select the transformer to use for service {}", service),
                    &["More than one transformer can handle this service"],
                    &options,
                    &first.transformer,
                )?;
                claims
                    .iter()
                    .find(|c| c.transformer == answer)
                    .unwrap_or(first)
                    .clone()
            };
            plan.services.insert(
                service,
                PlanService {
                    transformer: chosen.transformer,
                    paths: chosen.paths,
                    config: chosen.config,
                },
            );
        }

        info!(plan = %plan.name, services = plan.services.len(), "Plan built");
        Ok(plan)
    }

    /// Writes every candidate to `<output>/collect/services.yaml`
    pub async fn collect(&self, root: &Path, output: &Path) -> Result<PathBuf, PipelineError> {
        let root_dir = root.canonicalize().map_err(|e| PipelineError::io(root, e))?;
        let candidates = self.detect(&root_dir).await?;
        let dir = output.join(COLLECT_DIR);
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        let path = dir.join(COLLECT_FILE);
        let yaml = serde_yaml::to_string(&CollectedServices {
            kind: "CollectedServices",
            root_dir: &root_dir,
            services: &candidates,
        })
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        fs::write(&path, yaml).map_err(|e| PipelineError::io(&path, e))?;
        info!(path = %path.display(), services = candidates.len(), "Collected services written");
        Ok(path)
    }
}
