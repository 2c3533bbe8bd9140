//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { plan, services } => {
                info!(plan = %plan, services, "Starting transformation");
            }
            ProgressEvent::RoundStarted { round, pending } => {
                debug!(round, pending, "Starting round");
            }
            ProgressEvent::TransformerStarted {
                transformer,
                round,
                artifacts,
            } => {
                debug!(transformer = %transformer, round, artifacts, "Invoking transformer");
            }
            ProgressEvent::TransformerComplete {
                transformer,
                round,
                produced,
                mappings,
                duration,
            } => {
                debug!(
                    transformer = %transformer,
                    round,
                    produced,
                    mappings,
                    duration_ms = duration.as_millis(),
                    "Transformer complete"
                );
            }
            ProgressEvent::IrPreprocessed { artifacts } => {
                info!(artifacts, "IR preprocessed");
            }
            ProgressEvent::Materialized {
                files,
                collisions,
                partial,
            } => {
                if *partial {
                    warn!(files, collisions, "Partial output written");
                } else if *collisions > 0 {
                    warn!(files, collisions, "Output written with overwritten files");
                } else {
                    info!(files, "Output written");
                }
            }
            ProgressEvent::Completed { rounds, total_time } => {
                info!(
                    rounds,
                    total_time_ms = total_time.as_millis(),
                    "Transformation complete"
                );
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Transformation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_logging_all_events() {
        let handler = LoggingHandler;

        let events = vec![
            ProgressEvent::Started {
                plan: "shop".to_string(),
                services: 1,
            },
            ProgressEvent::RoundStarted { round: 1, pending: 1 },
            ProgressEvent::TransformerStarted {
                transformer: "Kubernetes".to_string(),
                round: 1,
                artifacts: 1,
            },
            ProgressEvent::TransformerComplete {
                transformer: "Kubernetes".to_string(),
                round: 1,
                produced: 1,
                mappings: 1,
                duration: Duration::from_millis(10),
            },
            ProgressEvent::IrPreprocessed { artifacts: 2 },
            ProgressEvent::Materialized {
                files: 4,
                collisions: 0,
                partial: false,
            },
            ProgressEvent::Materialized {
                files: 4,
                collisions: 1,
                partial: true,
            },
            ProgressEvent::Completed {
                rounds: 3,
                total_time: Duration::from_secs(5),
            },
            ProgressEvent::Failed {
                error: "Test error".to_string(),
            },
        ];

        for event in events {
            handler.on_progress(&event);
        }
    }
}
