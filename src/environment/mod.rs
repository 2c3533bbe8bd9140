//! Per-transformer filesystem sandbox
//!
//! A [`Workspace`] owns the scratch area of one pipeline run: a snapshot of
//! the user's source, one output area per transformer and one temp area per
//! transformer. It lives in a temporary directory that is removed when the
//! workspace is dropped, on every exit path.
//!
//! An [`Environment`] is the view a single transformer gets:
//!
//! - **context**: the directory holding its descriptor and templates
//! - **source**: the snapshot of the user's source
//! - **output**: a scratch directory that is fresh for every invocation
//! - **temp**: a private scratch directory
//!
//! Writes go through the environment's helpers, which refuse anything
//! outside the output or temp roots with [`PipelineError::SandboxEscape`].
//! Containment is checked on resolved paths, so symlinks cannot be used to
//! step out of a root.

pub mod paths;
mod workspace;

pub use workspace::Workspace;

use crate::cancel::CancelToken;
use crate::error::PipelineError;
use crate::qa::QuestionBridge;
use paths::absolute;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Which sandbox root a path lies in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Source,
    Output,
    Context,
    Temp,
    External,
}

pub struct Environment {
    name: String,
    project_name: String,
    context: PathBuf,
    rel_templates_dir: PathBuf,
    source: PathBuf,
    output_base: PathBuf,
    output: Mutex<PathBuf>,
    temp: PathBuf,
    invocations: AtomicUsize,
    file_mode: u32,
    dir_mode: u32,
    qa: Arc<QuestionBridge>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("source", &self.source)
            .field("output", &self.output())
            .field("temp", &self.temp)
            .finish()
    }
}

impl Environment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Root of the snapshotted user source
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Output scratch of the current invocation
    pub fn output(&self) -> PathBuf {
        self.output
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Root holding the descriptor and bundled assets
    pub fn context(&self) -> &Path {
        &self.context
    }

    /// Templates directory, relative to the context root
    pub fn rel_templates_dir(&self) -> &Path {
        &self.rel_templates_dir
    }

    /// Absolute templates directory
    pub fn templates_dir(&self) -> PathBuf {
        self.context.join(&self.rel_templates_dir)
    }

    pub fn temp(&self) -> &Path {
        &self.temp
    }

    pub fn qa(&self) -> &QuestionBridge {
        &self.qa
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.qa.cancel_token()
    }

    pub fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel_token().is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Starts a new invocation with an empty output scratch
    pub fn begin_invocation(&self) -> Result<PathBuf, PipelineError> {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let dir = self.output_base.join(n.to_string());
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }
        self.create_dir(&dir)?;
        match self.output.lock() {
            Ok(mut current) => *current = dir.clone(),
            Err(poisoned) => *poisoned.into_inner() = dir.clone(),
        }
        debug!(transformer = %self.name, invocation = n, "Output scratch reset");
        Ok(dir)
    }

    pub fn classify(&self, path: &Path) -> PathClass {
        let resolved = absolute(path);
        if resolved.starts_with(absolute(&self.output_base)) {
            PathClass::Output
        } else if resolved.starts_with(absolute(&self.temp)) {
            PathClass::Temp
        } else if resolved.starts_with(absolute(&self.source)) {
            PathClass::Source
        } else if resolved.starts_with(absolute(&self.context)) {
            PathClass::Context
        } else {
            PathClass::External
        }
    }

    /// Path relative to the root it lies in
    pub fn relative(&self, path: &Path) -> Option<(PathClass, PathBuf)> {
        let resolved = absolute(path);
        let class = self.classify(path);
        let root = match class {
            PathClass::Source => absolute(&self.source),
            PathClass::Output => absolute(&self.output()),
            PathClass::Context => absolute(&self.context),
            PathClass::Temp => absolute(&self.temp),
            PathClass::External => return None,
        };
        resolved
            .strip_prefix(&root)
            .ok()
            .map(|rel| (class, rel.to_path_buf()))
    }

    /// Fails unless `path` resolves inside one of the sandbox roots
    pub fn ensure_readable(&self, path: &Path) -> Result<PathBuf, PipelineError> {
        match self.classify(path) {
            PathClass::External => Err(PipelineError::SandboxEscape {
                path: path.to_path_buf(),
                root: self.source.clone(),
            }),
            _ => Ok(absolute(path)),
        }
    }

    /// Resolves a write target: relative paths land in the current output
    /// scratch, absolute ones must be inside the output scratch or temp.
    pub fn ensure_writable(&self, path: &Path) -> Result<PathBuf, PipelineError> {
        let output = self.output();
        let target = if path.is_relative() {
            output.join(path)
        } else {
            path.to_path_buf()
        };
        let resolved = absolute(&target);
        if resolved.starts_with(absolute(&output)) || resolved.starts_with(absolute(&self.temp)) {
            Ok(resolved)
        } else {
            Err(PipelineError::SandboxEscape {
                path: path.to_path_buf(),
                root: output,
            })
        }
    }

    pub fn read_to_string(&self, path: &Path) -> Result<String, PipelineError> {
        let resolved = self.ensure_readable(path)?;
        fs::read_to_string(&resolved).map_err(|e| PipelineError::io(path, e))
    }

    pub fn write_file(&self, path: &Path, contents: impl AsRef<[u8]>) -> Result<PathBuf, PipelineError> {
        let target = self.ensure_writable(path)?;
        if let Some(parent) = target.parent() {
            self.create_dir(parent)?;
        }
        fs::write(&target, contents).map_err(|e| PipelineError::io(&target, e))?;
        set_mode(&target, self.file_mode);
        Ok(target)
    }

    /// Writes into this transformer's temp area
    pub fn write_temp(&self, rel: &Path, contents: impl AsRef<[u8]>) -> Result<PathBuf, PipelineError> {
        self.write_file(&self.temp.join(rel), contents)
    }

    pub fn create_dir(&self, path: &Path) -> Result<(), PipelineError> {
        fs::create_dir_all(path).map_err(|e| PipelineError::io(path, e))?;
        set_mode(path, self.dir_mode);
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        debug!(path = %path.display(), error = %e, "Failed to set permissions");
    }
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, TempDir, Workspace, Environment) {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("app.js"), "console.log(1)").unwrap();
        let ctx = TempDir::new().unwrap();
        fs::create_dir_all(ctx.path().join("templates")).unwrap();
        let ws = Workspace::snapshot(src.path(), 0o644, 0o755).unwrap();
        let env = ws
            .environment(
                "Test",
                ctx.path(),
                Path::new("templates"),
                "proj",
                Arc::new(QuestionBridge::with_defaults()),
            )
            .unwrap();
        (src, ctx, ws, env)
    }

    #[test]
    fn test_roots_and_classification() {
        let (_src, ctx, _ws, env) = fixture();
        env.begin_invocation().unwrap();
        assert!(env.source().join("app.js").exists());
        assert_eq!(env.classify(&env.source().join("app.js")), PathClass::Source);
        assert_eq!(env.classify(&env.output().join("x")), PathClass::Output);
        assert_eq!(env.classify(&ctx.path().join("templates")), PathClass::Context);
        assert_eq!(env.classify(&env.temp().join("t")), PathClass::Temp);
        assert_eq!(env.classify(Path::new("/definitely/elsewhere")), PathClass::External);
        assert_eq!(env.templates_dir(), ctx.path().join("templates"));
    }

    #[test]
    fn test_output_is_fresh_per_invocation() {
        let (_src, _ctx, _ws, env) = fixture();
        let first = env.begin_invocation().unwrap();
        env.write_file(Path::new("a.txt"), "a").unwrap();
        let second = env.begin_invocation().unwrap();
        assert_ne!(first, second);
        assert!(!second.join("a.txt").exists());
        assert!(first.join("a.txt").exists());
    }

    #[test]
    fn test_write_outside_output_is_escape() {
        let (src, _ctx, _ws, env) = fixture();
        env.begin_invocation().unwrap();
        let err = env
            .write_file(&src.path().join("evil.txt"), "x")
            .unwrap_err();
        assert!(matches!(err, PipelineError::SandboxEscape { .. }));
        let err = env.write_file(Path::new("../../evil.txt"), "x").unwrap_err();
        assert!(matches!(err, PipelineError::SandboxEscape { .. }));
        assert!(!src.path().join("evil.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_output_is_escape() {
        let (_src, _ctx, _ws, env) = fixture();
        let outside = TempDir::new().unwrap();
        let out = env.begin_invocation().unwrap();
        std::os::unix::fs::symlink(outside.path(), out.join("link")).unwrap();
        let err = env.write_file(Path::new("link/f.txt"), "x").unwrap_err();
        assert!(matches!(err, PipelineError::SandboxEscape { .. }));
    }

    #[test]
    fn test_relative_reports_root() {
        let (_src, _ctx, _ws, env) = fixture();
        env.begin_invocation().unwrap();
        let (class, rel) = env.relative(&env.source().join("app.js")).unwrap();
        assert_eq!(class, PathClass::Source);
        assert_eq!(rel, PathBuf::from("app.js"));
    }
}
