use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Moves applications in a source tree onto Kubernetes
#[derive(Parser, Debug)]
#[command(
    name = "kubelift",
    about = "Discover services in a source tree and generate container and Kubernetes artifacts",
    version,
    long_about = "kubelift walks a source tree, detects the services in it and records them in \
                  a plan. Transforming the plan produces Dockerfiles, image build and push \
                  scripts, Kubernetes manifests and parameterized Helm, Kustomize and OpenShift \
                  variants of them."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Also append logs to this file"
    )]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "List every transformer able to handle each detected service",
        long_about = "Walks the source tree and writes collect/services.yaml under the output \
                      directory, listing every candidate transformer per detected service.\n\n\
                      Examples:\n  \
                      kubelift collect -s ./app\n  \
                      kubelift collect -s ./app -o ./collected"
    )]
    Collect(CollectArgs),

    #[command(
        about = "Detect services and write a plan",
        long_about = "Walks the source tree, asks every transformer which services it \
                      recognizes and writes the resulting plan.\n\n\
                      Examples:\n  \
                      kubelift plan -s ./app\n  \
                      kubelift plan -s ./app -n shop -p shop.plan"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Transform a plan into deployment artifacts",
        long_about = "Runs the transformers selected by a plan until no new artifacts appear \
                      and writes the output tree.\n\n\
                      Examples:\n  \
                      kubelift transform\n  \
                      kubelift transform -p shop.plan -o ./shop --qa-skip"
    )]
    Transform(TransformArgs),

    #[command(about = "Print the version")]
    Version,
}

/// Where question answers come from
#[derive(Args, Debug, Clone, Default)]
pub struct QaArgs {
    #[arg(long = "qa-file", value_name = "FILE", help = "YAML file of preset answers (repeatable)")]
    pub qa_files: Vec<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Record answers to, and replay them from, this file")]
    pub qa_store: Option<PathBuf>,

    #[arg(long, help = "Never prompt; use defaults for unanswered questions")]
    pub qa_skip: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CollectArgs {
    #[arg(short = 's', long, value_name = "DIR", default_value = ".", help = "Source directory")]
    pub source: PathBuf,

    #[arg(short = 'o', long, value_name = "DIR", default_value = ".", help = "Output directory")]
    pub output: PathBuf,

    #[arg(long = "transformer-dir", value_name = "DIR", help = "Extra transformer directory (repeatable)")]
    pub transformer_dirs: Vec<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(short = 's', long, value_name = "DIR", default_value = ".", help = "Source directory")]
    pub source: PathBuf,

    #[arg(short = 'n', long, value_name = "NAME", help = "Project name")]
    pub name: Option<String>,

    #[arg(
        short = 'p',
        long = "plan",
        value_name = "FILE",
        default_value = crate::plan::DEFAULT_PLAN_FILE,
        help = "Plan file to write"
    )]
    pub plan_file: PathBuf,

    #[arg(long = "transformer-dir", value_name = "DIR", help = "Extra transformer directory (repeatable)")]
    pub transformer_dirs: Vec<PathBuf>,

    #[command(flatten)]
    pub qa: QaArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct TransformArgs {
    #[arg(
        short = 'p',
        long = "plan",
        value_name = "FILE",
        default_value = crate::plan::DEFAULT_PLAN_FILE,
        help = "Plan file to transform"
    )]
    pub plan_file: PathBuf,

    #[arg(
        short = 'o',
        long,
        value_name = "DIR",
        help = "Output directory (defaults to ./<plan name>)"
    )]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "N", help = "Give up after this many rounds")]
    pub max_rounds: Option<usize>,

    #[arg(long, help = "Write accumulated output under .partial/ when cancelled")]
    pub allow_partial: bool,

    #[arg(long = "transformer-dir", value_name = "DIR", help = "Extra transformer directory (repeatable)")]
    pub transformer_dirs: Vec<PathBuf>,

    #[command(flatten)]
    pub qa: QaArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_plan_defaults() {
        let args = CliArgs::parse_from(["kubelift", "plan"]);
        match args.command {
            Commands::Plan(plan) => {
                assert_eq!(plan.source, PathBuf::from("."));
                assert_eq!(plan.plan_file, PathBuf::from("kubelift.plan"));
                assert!(plan.name.is_none());
                assert!(!plan.qa.qa_skip);
            }
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_transform_with_options() {
        let args = CliArgs::parse_from([
            "kubelift",
            "transform",
            "-p",
            "shop.plan",
            "-o",
            "/tmp/out",
            "--max-rounds",
            "7",
            "--allow-partial",
            "--qa-file",
            "a.yaml",
            "--qa-file",
            "b.yaml",
            "--qa-store",
            "store.yaml",
            "--qa-skip",
        ]);
        match args.command {
            Commands::Transform(t) => {
                assert_eq!(t.plan_file, PathBuf::from("shop.plan"));
                assert_eq!(t.output, Some(PathBuf::from("/tmp/out")));
                assert_eq!(t.max_rounds, Some(7));
                assert!(t.allow_partial);
                assert_eq!(t.qa.qa_files.len(), 2);
                assert_eq!(t.qa.qa_store, Some(PathBuf::from("store.yaml")));
                assert!(t.qa.qa_skip);
            }
            _ => panic!("Expected Transform command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from([
            "kubelift",
            "collect",
            "-s",
            "src",
            "--log-level",
            "debug",
            "--log-file",
            "k.log",
        ]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.log_file, Some(PathBuf::from("k.log")));
        assert!(matches!(args.command, Commands::Collect(_)));
    }

    #[test]
    fn test_version_command() {
        let args = CliArgs::parse_from(["kubelift", "version"]);
        assert!(matches!(args.command, Commands::Version));
    }
}
