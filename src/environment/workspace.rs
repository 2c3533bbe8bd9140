use super::paths::absolute;
use super::Environment;
use crate::error::PipelineError;
use crate::qa::QuestionBridge;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Scratch area of one pipeline run; removed on drop
pub struct Workspace {
    dir: TempDir,
    source: PathBuf,
    original_source: PathBuf,
    file_mode: u32,
    dir_mode: u32,
}

impl Workspace {
    /// Copies `source` into a fresh workspace. Transformers only ever see
    /// the copy; whatever they do to it is discarded with the workspace.
    pub fn snapshot(source: &Path, file_mode: u32, dir_mode: u32) -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new()
            .prefix("kubelift-")
            .tempdir()
            .map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
        let original_source = source
            .canonicalize()
            .map_err(|e| PipelineError::io(source, e))?;
        let snapshot = dir.path().join("source");
        copy_tree(&original_source, &snapshot)?;
        debug!(source = %original_source.display(), snapshot = %snapshot.display(), "Source snapshot taken");

        Ok(Self {
            source: snapshot,
            original_source,
            dir,
            file_mode,
            dir_mode,
        })
    }

    /// Uses `source` directly; for read-only phases such as planning
    pub fn in_place(source: &Path, file_mode: u32, dir_mode: u32) -> Result<Self, PipelineError> {
        let dir = tempfile::Builder::new()
            .prefix("kubelift-")
            .tempdir()
            .map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
        let source = source
            .canonicalize()
            .map_err(|e| PipelineError::io(source, e))?;
        Ok(Self {
            original_source: source.clone(),
            source,
            dir,
            file_mode,
            dir_mode,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The user's source tree the snapshot was taken from
    pub fn original_source(&self) -> &Path {
        &self.original_source
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn environment(
        &self,
        name: &str,
        context: &Path,
        rel_templates_dir: &Path,
        project_name: &str,
        qa: Arc<QuestionBridge>,
    ) -> Result<Environment, PipelineError> {
        let safe = sanitize(name);
        let output_base = self.dir.path().join("outputs").join(&safe);
        let temp = self.dir.path().join("temp").join(&safe);
        for dir in [&output_base, &temp] {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }

        Ok(Environment {
            name: name.to_string(),
            project_name: project_name.to_string(),
            context: absolute(context),
            rel_templates_dir: rel_templates_dir.to_path_buf(),
            source: self.source.clone(),
            output: Mutex::new(output_base.clone()),
            output_base,
            temp,
            invocations: AtomicUsize::new(0),
            file_mode: self.file_mode,
            dir_mode: self.dir_mode,
            qa,
        })
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Recursively copies `from` into `to`. Symlinks are followed only when they
/// resolve to a file inside `from`.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<usize, PipelineError> {
    let root = absolute(from);
    let mut copied = 0;
    fs::create_dir_all(to).map_err(|e| PipelineError::io(to, e))?;

    for entry in WalkDir::new(from).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
            PipelineError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        let rel = match entry.path().strip_prefix(from) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let dest = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| PipelineError::io(&dest, e))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest).map_err(|e| PipelineError::io(entry.path(), e))?;
            copied += 1;
        } else if file_type.is_symlink() {
            let target = absolute(entry.path());
            if target.starts_with(&root) && target.is_file() {
                fs::copy(&target, &dest).map_err(|e| PipelineError::io(&target, e))?;
                copied += 1;
            } else {
                warn!(path = %entry.path().display(), "Skipping symlink that is not a file inside the source tree");
            }
        }
    }
    Ok(copied)
}
