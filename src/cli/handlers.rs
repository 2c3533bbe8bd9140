//! Command handlers; each returns the process exit code

use super::commands::{CollectArgs, PlanArgs, QaArgs, TransformArgs};
use crate::cancel::CancelToken;
use crate::config::{QaConfig, RuntimeConfig};
use crate::engine::transform_plan;
use crate::environment::Workspace;
use crate::error::PipelineError;
use crate::plan::{Plan, PlanBuilder};
use crate::progress::LoggingHandler;
use crate::qa::QuestionBridge;
use crate::transformer::{ClassTable, TransformerRegistry};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Exit code for a failed command; errors that are not pipeline errors
/// count as input errors
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PipelineError>()
        .map(PipelineError::exit_code)
        .unwrap_or(1)
}

fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PipelineError>() {
        Some(e) => eprintln!("{}", e.diagnostic()),
        None => eprintln!("error: {:#}", err),
    }
    exit_code_for(err)
}

fn qa_config(args: &QaArgs) -> QaConfig {
    QaConfig {
        answers_files: args.qa_files.clone(),
        record_store: args.qa_store.clone(),
        interactive: !args.qa_skip,
    }
}

fn question_bridge(config: &QaConfig, cancel: CancelToken) -> Result<Arc<QuestionBridge>> {
    let qa = QuestionBridge::from_config(config, cancel)
        .context("Failed to set up question answering")?;
    Ok(Arc::new(qa))
}

fn require_dir(path: &std::path::Path) -> Result<(), PipelineError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(PipelineError::InvalidInput(format!(
            "source directory does not exist: {}",
            path.display()
        )))
    }
}

async fn run_collect(args: &CollectArgs, cancel: CancelToken) -> Result<PathBuf> {
    require_dir(&args.source)?;
    let mut config = RuntimeConfig {
        source_dir: args.source.clone(),
        ..RuntimeConfig::default()
    };
    config.transformer_dirs.extend(args.transformer_dirs.iter().cloned());

    let qa = question_bridge(
        &QaConfig {
            interactive: false,
            ..QaConfig::default()
        },
        cancel,
    )?;
    let workspace = Workspace::in_place(&config.source_dir, config.file_mode, config.dir_mode)?;
    let registry = TransformerRegistry::load(
        &config,
        &ClassTable::with_defaults(),
        &workspace,
        qa.clone(),
        &BTreeSet::new(),
    )?;
    let path = PlanBuilder::new(&registry, &qa)
        .with_ignore_file(&config.ignore_file_name)
        .collect(workspace.source(), &args.output)
        .await?;
    Ok(path)
}

async fn run_plan(args: &PlanArgs, cancel: CancelToken) -> Result<PathBuf> {
    require_dir(&args.source)?;
    let mut config = RuntimeConfig {
        source_dir: args.source.clone(),
        qa: qa_config(&args.qa),
        ..RuntimeConfig::default()
    };
    if let Some(name) = &args.name {
        config.project_name = name.clone();
    }
    config.transformer_dirs.extend(args.transformer_dirs.iter().cloned());

    let qa = question_bridge(&config.qa, cancel)?;
    let workspace = Workspace::in_place(&config.source_dir, config.file_mode, config.dir_mode)?;
    let registry = TransformerRegistry::load(
        &config,
        &ClassTable::with_defaults(),
        &workspace,
        qa.clone(),
        &BTreeSet::new(),
    )?;
    let mut plan = PlanBuilder::new(&registry, &qa)
        .with_ignore_file(&config.ignore_file_name)
        .build(&config.project_name, workspace.source())
        .await?;
    plan.configuration.transformer_dirs = args.transformer_dirs.clone();
    plan.save(&args.plan_file)?;
    Ok(args.plan_file.clone())
}

async fn run_transform(args: &TransformArgs, cancel: CancelToken) -> Result<PathBuf> {
    let plan = Plan::load(&args.plan_file)
        .with_context(|| format!("Failed to load plan {}", args.plan_file.display()))?;

    let mut config = RuntimeConfig {
        project_name: plan.name.clone(),
        source_dir: plan.root_dir.clone(),
        qa: qa_config(&args.qa),
        ..RuntimeConfig::default()
    };
    config.output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(".").join(&plan.name));
    if let Some(max_rounds) = args.max_rounds {
        config.max_rounds = max_rounds;
    }
    config.allow_partial |= args.allow_partial;
    config.transformer_dirs.extend(args.transformer_dirs.iter().cloned());
    config
        .validate()
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
    debug!("{}", config);

    let qa = question_bridge(&config.qa, cancel)?;
    let summary = transform_plan(
        &plan,
        &config,
        &ClassTable::with_defaults(),
        qa,
        Arc::new(LoggingHandler),
    )
    .await?;
    info!(
        rounds = summary.rounds,
        artifacts = summary.artifacts,
        files = summary.report.files.len(),
        "Transform finished"
    );
    Ok(summary.output)
}

pub async fn handle_collect(args: &CollectArgs, cancel: CancelToken) -> i32 {
    match run_collect(args, cancel).await {
        Ok(path) => {
            println!("Collected services written to {}", path.display());
            0
        }
        Err(e) => report(&e),
    }
}

pub async fn handle_plan(args: &PlanArgs, cancel: CancelToken) -> i32 {
    match run_plan(args, cancel).await {
        Ok(path) => {
            println!("Plan written to {}", path.display());
            0
        }
        Err(e) => report(&e),
    }
}

pub async fn handle_transform(args: &TransformArgs, cancel: CancelToken) -> i32 {
    match run_transform(args, cancel).await {
        Ok(path) => {
            println!("Output written to {}", path.display());
            0
        }
        Err(e) => report(&e),
    }
}

pub fn handle_version() -> i32 {
    println!("{} {}", crate::NAME, crate::VERSION);
    0
}
