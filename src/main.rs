use kubelift::cancel::CancelToken;
use kubelift::cli::commands::{CliArgs, Commands};
use kubelift::cli::handlers::{handle_collect, handle_plan, handle_transform, handle_version};
use kubelift::util::logging::{init_logging, parse_level, LoggingConfig};
use kubelift::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, warn, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("kubelift v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });

    let exit_code = match &args.command {
        Commands::Collect(collect_args) => handle_collect(collect_args, cancel).await,
        Commands::Plan(plan_args) => handle_plan(plan_args, cancel).await,
        Commands::Transform(transform_args) => handle_transform(transform_args, cancel).await,
        Commands::Version => handle_version(),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = match &args.log_level {
        Some(level_str) => parse_level(level_str),
        None => env::var("KUBELIFT_LOG_LEVEL")
            .map(|l| parse_level(&l))
            .unwrap_or(Level::INFO),
    };

    let use_json = env::var("KUBELIFT_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    let mut config = LoggingConfig {
        level,
        use_json,
        ..LoggingConfig::default()
    };
    if let Some(path) = &args.log_file {
        config = config.with_log_file(path);
    }
    init_logging(config);
}
