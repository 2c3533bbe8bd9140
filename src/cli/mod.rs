pub mod commands;
pub mod handlers;

pub use commands::{CliArgs, CollectArgs, Commands, PlanArgs, QaArgs, TransformArgs};
