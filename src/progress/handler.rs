//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while the engine drives artifacts to a fixed point
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Transform run started
    Started { plan: String, services: usize },

    /// A round started with this many pending artifacts
    RoundStarted { round: usize, pending: usize },

    /// A transformer is about to receive artifacts
    TransformerStarted {
        transformer: String,
        round: usize,
        artifacts: usize,
    },

    /// A transformer returned
    TransformerComplete {
        transformer: String,
        round: usize,
        produced: usize,
        mappings: usize,
        duration: Duration,
    },

    /// Held back IR artifacts went through the preprocessor chain
    IrPreprocessed { artifacts: usize },

    /// Path mappings were applied to the output directory
    Materialized {
        files: usize,
        collisions: usize,
        partial: bool,
    },

    /// Transform run completed
    Completed { rounds: usize, total_time: Duration },

    /// Transform run failed
    Failed { error: String },
}

/// Trait for handling progress events of a transform run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::Started {
            plan: "shop".to_string(),
            services: 2,
        });
        handler.on_progress(&ProgressEvent::RoundStarted { round: 1, pending: 2 });
        handler.on_progress(&ProgressEvent::Completed {
            rounds: 3,
            total_time: Duration::from_secs(5),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::RoundStarted { round: 1, pending: 4 };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("RoundStarted"));
        assert!(debug_str.contains("round: 1"));
    }
}
