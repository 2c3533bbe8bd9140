//! kubelift - moves applications in a source tree onto Kubernetes
//!
//! A run has two stages. Planning walks the source tree and asks every
//! transformer which services it recognizes; the outcome is a [`Plan`].
//! Transforming seeds one artifact per planned service and lets transformers
//! trade artifacts until nothing new appears, then writes the accumulated
//! path mappings to the output tree.
//!
//! # Core Concepts
//!
//! - **Artifact**: a typed message on the bus, deduplicated by name, type and
//!   payload hash
//! - **Transformer**: consumes artifacts of some types and produces new
//!   artifacts plus deferred [`PathMapping`]s
//! - **IR**: the intermediate representation of deployable services, refined
//!   by a fixed preprocessor chain before manifests are emitted
//! - **Question bridge**: the single channel through which transformers ask
//!   the user for decisions
//!
//! # Example Usage
//!
//! ```no_run
//! use kubelift::{transform_plan, ClassTable, LoggingHandler, Plan, QuestionBridge, RuntimeConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), kubelift::PipelineError> {
//! let plan = Plan::load(Path::new("kubelift.plan"))?;
//! let config = RuntimeConfig {
//!     source_dir: plan.root_dir.clone(),
//!     output_dir: "./out".into(),
//!     ..RuntimeConfig::default()
//! };
//! let summary = transform_plan(
//!     &plan,
//!     &config,
//!     &ClassTable::with_defaults(),
//!     Arc::new(QuestionBridge::with_defaults()),
//!     Arc::new(LoggingHandler),
//! )
//! .await?;
//! println!("{} files written", summary.report.files.len());
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod ir;
pub mod materialize;
pub mod plan;
pub mod progress;
pub mod qa;
pub mod template;
pub mod transformer;
pub mod util;

pub use artifact::{Artifact, ArtifactKey, ArtifactType, Config, ConfigType, Configs, PathMapping, PathMappingType, PathType};
pub use cancel::CancelToken;
pub use config::{ConfigError, QaConfig, RuntimeConfig};
pub use engine::{transform_plan, TransformEngine, TransformSummary};
pub use environment::{Environment, Workspace};
pub use error::PipelineError;
pub use ir::Ir;
pub use materialize::{MaterializeReport, Materializer};
pub use plan::{Plan, PlanBuilder, PlanService};
pub use progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
pub use qa::QuestionBridge;
pub use transformer::{ClassTable, Transformer, TransformerDescriptor, TransformerRegistry};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_kubelift() {
        assert_eq!(NAME, "kubelift");
    }
}
