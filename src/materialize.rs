//! Applies accumulated path mappings to the output tree
//!
//! Mappings apply in insertion order, so when two mappings write the same
//! destination the later one wins. Overwriting a file an earlier mapping
//! produced with different content logs a warning. A Source mapping that
//! repeats an earlier one exactly is applied once, so it cannot clobber files
//! rendered over the source copy in between.
//!
//! Every mapping source must resolve inside the user source or one of the
//! registered input roots, and every write must resolve inside the output
//! root. Both checks run on resolved paths, so a symlink already present in
//! the output tree cannot redirect a write.

use crate::artifact::{PathMapping, PathMappingType};
use crate::environment::paths::{absolute, is_contained_relative};
use crate::environment::set_mode;
use crate::error::PipelineError;
use crate::template::{is_template, TemplateRenderer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Every file written, relative to the output root, in first-write order
    pub files: Vec<PathBuf>,
    /// Destinations overwritten by a later mapping with different content
    pub collisions: Vec<PathBuf>,
}

pub struct Materializer<'a> {
    output: PathBuf,
    output_root: PathBuf,
    source: &'a Path,
    input_roots: Vec<PathBuf>,
    renderer: TemplateRenderer,
    file_mode: u32,
    dir_mode: u32,
    written: BTreeMap<PathBuf, usize>,
    report: MaterializeReport,
}

impl<'a> Materializer<'a> {
    /// `source` is the pristine user source that Source mappings copy from
    pub fn new(output: &Path, source: &'a Path, file_mode: u32, dir_mode: u32) -> Self {
        Self {
            output: output.to_path_buf(),
            output_root: absolute(output),
            source,
            input_roots: vec![absolute(source)],
            renderer: TemplateRenderer::new(),
            file_mode,
            dir_mode,
            written: BTreeMap::new(),
            report: MaterializeReport::default(),
        }
    }

    /// Adds directories Template and Default mappings may read from, such as
    /// transformer contexts and the run's workspace
    pub fn with_input_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.input_roots
            .extend(roots.into_iter().map(|root| absolute(root.as_ref())));
        self
    }

    pub fn apply_all(mut self, mappings: &[PathMapping]) -> Result<MaterializeReport, PipelineError> {
        fs::create_dir_all(&self.output).map_err(|e| PipelineError::io(&self.output, e))?;
        set_mode(&self.output, self.dir_mode);
        self.output_root = absolute(&self.output);

        let mut applied_sources = HashSet::new();
        for (index, mapping) in mappings.iter().enumerate() {
            if mapping.mapping_type == PathMappingType::Source
                && !applied_sources.insert((mapping.src_path.clone(), mapping.dest_path.clone()))
            {
                debug!(dest = %mapping.dest_path.display(), "Skipping repeated source mapping");
                continue;
            }
            self.apply(index, mapping)?;
        }
        Ok(self.report)
    }

    fn dest_root(&self, mapping: &PathMapping) -> Result<PathBuf, PipelineError> {
        if !is_contained_relative(&mapping.dest_path) {
            return Err(PipelineError::SandboxEscape {
                path: mapping.dest_path.clone(),
                root: self.output.clone(),
            });
        }
        Ok(self.output.join(&mapping.dest_path))
    }

    fn apply(&mut self, index: usize, mapping: &PathMapping) -> Result<(), PipelineError> {
        let dest = self.dest_root(mapping)?;
        debug!(
            mapping = %mapping.mapping_type,
            src = %mapping.src_path.display(),
            dest = %mapping.dest_path.display(),
            "Applying path mapping"
        );

        match mapping.mapping_type {
            PathMappingType::Source => {
                let src = if mapping.src_path.as_os_str().is_empty() {
                    self.source.to_path_buf()
                } else if mapping.src_path.is_absolute() {
                    mapping.src_path.clone()
                } else {
                    self.source.join(&mapping.src_path)
                };
                if !absolute(&src).starts_with(absolute(self.source)) {
                    return Err(PipelineError::SandboxEscape {
                        path: src,
                        root: self.source.to_path_buf(),
                    });
                }
                self.copy(index, &src, &dest, None)
            }
            PathMappingType::Default => {
                let src = self.readable(&mapping.src_path)?;
                self.copy(index, &src, &dest, None)
            }
            PathMappingType::Template => {
                let src = self.readable(&mapping.src_path)?;
                let config = mapping.template_config.clone().unwrap_or(Value::Null);
                self.copy(index, &src, &dest, Some(&config))
            }
        }
    }

    fn readable(&self, src: &Path) -> Result<PathBuf, PipelineError> {
        let resolved = absolute(src);
        if self.input_roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(src.to_path_buf())
        } else {
            Err(PipelineError::SandboxEscape {
                path: src.to_path_buf(),
                root: self.source.to_path_buf(),
            })
        }
    }

    fn copy(
        &mut self,
        index: usize,
        src: &Path,
        dest: &Path,
        render: Option<&Value>,
    ) -> Result<(), PipelineError> {
        if src.is_file() {
            return self.write_one(index, src, dest, render);
        }
        if !src.is_dir() {
            return Err(PipelineError::io(
                src,
                std::io::Error::new(std::io::ErrorKind::NotFound, "mapping source does not exist"),
            ));
        }

        for entry in WalkDir::new(src).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                PipelineError::io(src, std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
            self.write_one(index, entry.path(), &dest.join(rel), render)?;
        }
        Ok(())
    }

    fn write_one(
        &mut self,
        index: usize,
        src: &Path,
        dest: &Path,
        render: Option<&Value>,
    ) -> Result<(), PipelineError> {
        if !absolute(dest).starts_with(&self.output_root) {
            return Err(PipelineError::SandboxEscape {
                path: dest.to_path_buf(),
                root: self.output.clone(),
            });
        }
        let raw = fs::read(src).map_err(|e| PipelineError::io(src, e))?;
        let contents = match render {
            Some(config) if is_template(&raw) => {
                let text = String::from_utf8_lossy(&raw);
                self.renderer
                    .render(&text, config)
                    .map_err(|reason| PipelineError::TemplateRender {
                        path: src.to_path_buf(),
                        reason,
                    })?
                    .into_bytes()
            }
            _ => raw,
        };

        let rel = dest
            .strip_prefix(&self.output)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| dest.to_path_buf());
        match self.written.get(&rel) {
            Some(&previous) if previous != index => {
                let existing = fs::read(dest).unwrap_or_default();
                if existing != contents {
                    warn!(
                        dest = %rel.display(),
                        earlier = previous,
                        later = index,
                        "Path mapping overwrites output of an earlier mapping"
                    );
                    self.report.collisions.push(rel.clone());
                }
            }
            Some(_) => {}
            None => self.report.files.push(rel.clone()),
        }
        self.written.insert(rel, index);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        fs::write(dest, &contents).map_err(|e| PipelineError::io(dest, e))?;
        set_mode(dest, self.file_mode);
        Ok(())
    }
}
