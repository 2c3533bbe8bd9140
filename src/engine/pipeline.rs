//! Plan to output tree: snapshot, load, transform, materialize

use super::{Aborted, EngineRun, TransformEngine, PARTIAL_DIR};
use crate::config::RuntimeConfig;
use crate::environment::Workspace;
use crate::error::PipelineError;
use crate::materialize::{MaterializeReport, Materializer};
use crate::plan::Plan;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::qa::QuestionBridge;
use crate::transformer::{ClassTable, TransformerRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSummary {
    pub output: PathBuf,
    pub rounds: usize,
    pub artifacts: usize,
    pub report: MaterializeReport,
}

/// Where a run's mappings may read from besides the user source
struct Inputs<'a> {
    workspace: &'a Workspace,
    contexts: Vec<PathBuf>,
}

fn materialize(
    output: &Path,
    inputs: &Inputs<'_>,
    config: &RuntimeConfig,
    run: &EngineRun,
) -> Result<MaterializeReport, PipelineError> {
    Materializer::new(
        output,
        inputs.workspace.original_source(),
        config.file_mode,
        config.dir_mode,
    )
    .with_input_roots(
        std::iter::once(inputs.workspace.root())
            .chain(inputs.contexts.iter().map(PathBuf::as_path)),
    )
    .apply_all(&run.mappings)
}

fn write_partial(
    inputs: &Inputs<'_>,
    config: &RuntimeConfig,
    run: &EngineRun,
    progress: &dyn ProgressHandler,
) {
    let dir = config.output_dir.join(PARTIAL_DIR);
    match materialize(&dir, inputs, config, run) {
        Ok(report) => progress.on_progress(&ProgressEvent::Materialized {
            files: report.files.len(),
            collisions: report.collisions.len(),
            partial: true,
        }),
        Err(e) => warn!(dir = %dir.display(), error = %e, "Partial output incomplete"),
    }
}

/// Runs `plan` end to end and writes the result under `config.output_dir`.
///
/// The plan's name overrides `config.project_name`, and its transformer
/// directories are searched after the configured ones. On non-convergence,
/// a dedup conflict or a render failure the accumulated mappings land under
/// `.partial/`; a cancelled run does the same only when `allow_partial` is
/// set.
pub async fn transform_plan(
    plan: &Plan,
    config: &RuntimeConfig,
    classes: &ClassTable,
    qa: Arc<QuestionBridge>,
    progress: Arc<dyn ProgressHandler>,
) -> Result<TransformSummary, PipelineError> {
    let start = Instant::now();
    let mut config = config.clone();
    config.project_name = plan.name.clone();
    config
        .transformer_dirs
        .extend(plan.configuration.transformer_dirs.iter().cloned());

    let workspace = Workspace::snapshot(&plan.root_dir, config.file_mode, config.dir_mode)?;
    let registry = TransformerRegistry::load(
        &config,
        classes,
        &workspace,
        qa.clone(),
        &plan.selected_transformers(),
    )?;
    let inputs = Inputs {
        workspace: &workspace,
        contexts: registry.context_dirs(),
    };
    info!(
        plan = %plan.name,
        services = plan.services.len(),
        transformers = registry.len(),
        "Starting transform"
    );
    progress.on_progress(&ProgressEvent::Started {
        plan: plan.name.clone(),
        services: plan.services.len(),
    });

    let engine = TransformEngine::new(&registry, qa, &plan.name)
        .with_max_rounds(config.max_rounds)
        .with_progress(progress.clone());
    let run = match engine.run(plan.seed_artifacts(workspace.source())).await {
        Ok(run) => run,
        Err(Aborted { error, run }) => {
            let partial = error.emits_partial()
                || (matches!(error, PipelineError::Cancelled) && config.allow_partial);
            if partial {
                write_partial(&inputs, &config, &run, progress.as_ref());
            }
            progress.on_progress(&ProgressEvent::Failed {
                error: error.to_string(),
            });
            return Err(error);
        }
    };

    let report = match materialize(&config.output_dir, &inputs, &config, &run) {
        Ok(report) => report,
        Err(error) => {
            if error.emits_partial() {
                write_partial(&inputs, &config, &run, progress.as_ref());
            }
            progress.on_progress(&ProgressEvent::Failed {
                error: error.to_string(),
            });
            return Err(error);
        }
    };
    progress.on_progress(&ProgressEvent::Materialized {
        files: report.files.len(),
        collisions: report.collisions.len(),
        partial: false,
    });
    progress.on_progress(&ProgressEvent::Completed {
        rounds: run.rounds,
        total_time: start.elapsed(),
    });

    Ok(TransformSummary {
        output: config.output_dir.clone(),
        rounds: run.rounds,
        artifacts: run.seen.len(),
        report,
    })
}
