//! Shared helpers for integration tests

#![allow(dead_code)]

use kubelift::transformer::ClassTable;
use kubelift::{
    transform_plan, NoOpHandler, PipelineError, Plan, PlanBuilder, QuestionBridge, RuntimeConfig,
    TransformSummary, TransformerRegistry, Workspace,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const NODE_PACKAGE: &str =
    r#"{"name":"app","scripts":{"build":"tsc"},"engines":{"node":"18.2.0"}}"#;

/// A source tree and a sibling output directory
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("src")).expect("Failed to create source dir");
        Self { dir }
    }

    pub fn source(&self) -> PathBuf {
        self.dir.path().join("src")
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.source().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, contents).expect("Failed to write file");
        self
    }

    /// Node.js service `app` under `web/` listening on 3000
    pub fn with_node_service(self) -> Self {
        self.write("web/package.json", NODE_PACKAGE)
            .write("web/.env", "PORT=3000\n")
            .write("web/index.js", "console.log('hi')\n");
        self
    }

    pub fn config(&self, output: &Path) -> RuntimeConfig {
        RuntimeConfig {
            project_name: "shop".into(),
            source_dir: self.source(),
            output_dir: output.to_path_buf(),
            ..RuntimeConfig::default()
        }
    }
}

pub fn defaults() -> Arc<QuestionBridge> {
    Arc::new(QuestionBridge::with_defaults())
}

pub async fn build_plan(project: &Project, qa: &Arc<QuestionBridge>) -> Plan {
    let config = project.config(&project.output("unused"));
    let workspace = Workspace::in_place(&config.source_dir, config.file_mode, config.dir_mode)
        .expect("workspace");
    let registry = TransformerRegistry::load(
        &config,
        &ClassTable::with_defaults(),
        &workspace,
        qa.clone(),
        &BTreeSet::new(),
    )
    .expect("registry");
    PlanBuilder::new(&registry, qa)
        .build("shop", workspace.source())
        .await
        .expect("plan")
}

pub async fn transform(
    project: &Project,
    plan: &Plan,
    output: &Path,
    qa: Arc<QuestionBridge>,
) -> Result<TransformSummary, PipelineError> {
    transform_plan(
        plan,
        &project.config(output),
        &ClassTable::with_defaults(),
        qa,
        Arc::new(NoOpHandler),
    )
    .await
}

/// Every file under `root`, keyed by relative path
pub fn tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}
