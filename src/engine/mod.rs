//! Iterative transform engine
//!
//! The engine alone owns the pending queue, the seen list and the accumulated
//! path mappings. Every round hands the pending artifacts to each transformer
//! in registry order and queues whatever comes back, until a round produces
//! nothing new.
//!
//! IR artifacts are held back while the rest of the bus settles. Once nothing
//! else is pending they go through the [`PreprocessorChain`] and are released
//! into the next round, so manifest emitters only ever see refined IR.

mod pipeline;

pub use pipeline::{transform_plan, TransformSummary};

use crate::artifact::{Artifact, ArtifactKey, ArtifactType, PathMapping};
use crate::error::PipelineError;
use crate::ir::preprocess::PreprocessorChain;
use crate::ir::Ir;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::qa::QuestionBridge;
use crate::transformer::TransformerRegistry;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Output subdirectory that receives accumulated mappings of an aborted run
pub const PARTIAL_DIR: &str = ".partial";

/// Everything a run accumulated
#[derive(Debug, Default, Clone)]
pub struct EngineRun {
    pub rounds: usize,
    pub seen: Vec<Artifact>,
    pub mappings: Vec<PathMapping>,
}

/// A run that stopped early, with whatever it accumulated until then
#[derive(Debug)]
pub struct Aborted {
    pub error: PipelineError,
    pub run: EngineRun,
}

/// Errors that skip one transformer's contribution instead of ending the run
fn is_recoverable(err: &PipelineError) -> bool {
    matches!(
        err,
        PipelineError::Io { .. }
            | PipelineError::NoSuchConfig(_)
            | PipelineError::ConfigShape { .. }
            | PipelineError::InvalidInput(_)
    )
}

#[derive(Default)]
struct Bus {
    payloads: HashMap<ArtifactKey, String>,
    pending: Vec<Artifact>,
    held: Vec<Artifact>,
    refined: HashSet<ArtifactKey>,
}

impl Bus {
    /// Records `artifact`; false when an identical one was queued before
    fn admit(&mut self, artifact: &Artifact) -> Result<bool, PipelineError> {
        let payload = artifact.canonical_payload();
        match self.payloads.entry(artifact.key()) {
            Entry::Occupied(e) if *e.get() == payload => Ok(false),
            Entry::Occupied(_) => Err(PipelineError::DedupConflict {
                name: artifact.name.clone(),
                artifact_type: artifact.artifact_type.to_string(),
            }),
            Entry::Vacant(e) => {
                e.insert(payload);
                Ok(true)
            }
        }
    }

    fn enqueue(&mut self, artifact: Artifact) -> Result<(), PipelineError> {
        if !self.admit(&artifact)? {
            debug!(artifact = %artifact.name, artifact_type = %artifact.artifact_type, "Duplicate artifact dropped");
            return Ok(());
        }
        if artifact.artifact_type == ArtifactType::IR && !self.refined.contains(&artifact.key()) {
            self.held.push(artifact);
        } else {
            self.pending.push(artifact);
        }
        Ok(())
    }
}

pub struct TransformEngine<'a> {
    registry: &'a TransformerRegistry,
    qa: Arc<QuestionBridge>,
    chain: PreprocessorChain,
    max_rounds: usize,
    progress: Arc<dyn ProgressHandler>,
}

impl<'a> TransformEngine<'a> {
    /// Engine with the standard preprocessor chain for `project`
    pub fn new(registry: &'a TransformerRegistry, qa: Arc<QuestionBridge>, project: &str) -> Self {
        Self {
            registry,
            qa,
            chain: PreprocessorChain::standard(project),
            max_rounds: 100,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_chain(mut self, chain: PreprocessorChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    /// Drives `seeds` to a fixed point
    pub async fn run(&self, seeds: Vec<Artifact>) -> Result<EngineRun, Aborted> {
        let mut run = EngineRun::default();
        match self.drive(seeds, &mut run).await {
            Ok(()) => {
                info!(
                    rounds = run.rounds,
                    artifacts = run.seen.len(),
                    mappings = run.mappings.len(),
                    "Transform converged"
                );
                Ok(run)
            }
            Err(error) => Err(Aborted { error, run }),
        }
    }

    async fn drive(&self, seeds: Vec<Artifact>, run: &mut EngineRun) -> Result<(), PipelineError> {
        let mut bus = Bus::default();
        for seed in seeds {
            bus.enqueue(seed)?;
        }

        loop {
            if bus.pending.is_empty() {
                if bus.held.is_empty() {
                    return Ok(());
                }
                self.refine(&mut bus)?;
                continue;
            }
            if run.rounds >= self.max_rounds {
                return Err(PipelineError::TransformNotConverged { rounds: run.rounds });
            }
            if self.qa.cancel_token().is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            run.rounds += 1;
            let round = run.rounds;
            let new = std::mem::take(&mut bus.pending);
            run.seen.extend(new.iter().cloned());
            self.progress.on_progress(&ProgressEvent::RoundStarted {
                round,
                pending: new.len(),
            });

            for transformer in self.registry.iter() {
                let filtered: Vec<Artifact> =
                    new.iter().filter(|a| transformer.accepts(a)).cloned().collect();
                if filtered.is_empty() {
                    continue;
                }

                self.progress.on_progress(&ProgressEvent::TransformerStarted {
                    transformer: transformer.name().to_string(),
                    round,
                    artifacts: filtered.len(),
                });
                let started = Instant::now();
                let output = match transformer.transform(&filtered, &run.seen).await {
                    Ok(output) => output,
                    Err(e) if is_recoverable(&e) => {
                        error!(
                            transformer = %transformer.name(),
                            round,
                            error = %e,
                            "Transformer failed, skipping its contribution"
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                self.progress.on_progress(&ProgressEvent::TransformerComplete {
                    transformer: transformer.name().to_string(),
                    round,
                    produced: output.artifacts.len(),
                    mappings: output.path_mappings.len(),
                    duration: started.elapsed(),
                });
                run.mappings.extend(output.path_mappings);
                for artifact in output.artifacts {
                    bus.enqueue(artifact)?;
                }
            }
        }
    }

    /// Runs held IR artifacts through the chain and queues the results
    fn refine(&self, bus: &mut Bus) -> Result<(), PipelineError> {
        let held = std::mem::take(&mut bus.held);
        let count = held.len();
        for mut artifact in held {
            match artifact.config::<Ir>() {
                Ok(ir) => {
                    let ir = self.chain.run(ir, &self.qa)?;
                    artifact.set_config(ir);
                }
                Err(e) => {
                    debug!(artifact = %artifact.name, error = %e, "IR artifact without IR config");
                }
            }
            bus.refined.insert(artifact.key());
            bus.enqueue(artifact)?;
        }
        self.progress
            .on_progress(&ProgressEvent::IrPreprocessed { artifacts: count });
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::artifact::ServiceConfig;
    use crate::environment::Workspace;
    use crate::ir::preprocess::fixtures::web_ir;
    use crate::transformer::{
        ClassTable, TransformOutput, Transformer, TransformerConfig, TransformerDescriptor,
    };
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    pub(crate) const TICK: &str = "Tick";

    /// Always emits a tick with a count one higher than any it was given
    pub(crate) struct Spinner;

    #[async_trait]
    impl Transformer for Spinner {
        async fn transform(
            &self,
            _config: &TransformerConfig,
            new: &[Artifact],
            _seen: &[Artifact],
        ) -> Result<TransformOutput, PipelineError> {
            let count = new
                .iter()
                .filter_map(|a| a.first_path("Count"))
                .filter_map(|p| p.to_str()?.parse::<u64>().ok())
                .max()
                .unwrap_or(0);
            Ok(TransformOutput {
                path_mappings: Vec::new(),
                artifacts: vec![Artifact::new("tick", TICK).with_path("Count", (count + 1).to_string())],
            })
        }
    }

    /// Re-emits the same artifact for every input
    struct Repeater;

    #[async_trait]
    impl Transformer for Repeater {
        async fn transform(
            &self,
            _config: &TransformerConfig,
            _new: &[Artifact],
            _seen: &[Artifact],
        ) -> Result<TransformOutput, PipelineError> {
            Ok(TransformOutput {
                path_mappings: vec![PathMapping::copy("/tmp/x", "x")],
                artifacts: vec![Artifact::new("same", "Echo")],
            })
        }
    }

    /// Records the order it was called in and how many seen artifacts it got
    struct Recorder {
        log: Arc<Mutex<Vec<(String, usize)>>>,
        fail: bool,
    }

    #[async_trait]
    impl Transformer for Recorder {
        async fn transform(
            &self,
            config: &TransformerConfig,
            _new: &[Artifact],
            seen: &[Artifact],
        ) -> Result<TransformOutput, PipelineError> {
            self.log
                .lock()
                .unwrap()
                .push((config.name().to_string(), seen.len()));
            if self.fail {
                return Err(PipelineError::io(
                    "/missing",
                    std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                ));
            }
            Ok(TransformOutput::default())
        }
    }

    /// Emits the IR of every service it is handed, unrefined
    struct IrEmitter;

    #[async_trait]
    impl Transformer for IrEmitter {
        async fn transform(
            &self,
            _config: &TransformerConfig,
            new: &[Artifact],
            _seen: &[Artifact],
        ) -> Result<TransformOutput, PipelineError> {
            Ok(TransformOutput {
                path_mappings: Vec::new(),
                artifacts: new
                    .iter()
                    .map(|a| Artifact::new(&a.name, ArtifactType::IR).with_config(web_ir()))
                    .collect(),
            })
        }
    }

    /// Records the replica count of every IR it receives
    struct IrSink {
        replicas: Arc<Mutex<Vec<Option<u32>>>>,
    }

    #[async_trait]
    impl Transformer for IrSink {
        async fn transform(
            &self,
            _config: &TransformerConfig,
            new: &[Artifact],
            _seen: &[Artifact],
        ) -> Result<TransformOutput, PipelineError> {
            for artifact in new {
                let ir: Ir = artifact.config()?;
                let mut lock = self.replicas.lock().unwrap();
                lock.extend(ir.services.values().map(|s| s.replicas));
            }
            Ok(TransformOutput::default())
        }
    }

    pub(crate) fn descriptor(name: &str, class: &str, priority: i32, consumes: &[&str]) -> TransformerDescriptor {
        let mut d = TransformerDescriptor::new(name, class);
        d.spec.priority = priority;
        d.spec.consumes = consumes.iter().map(|c| ArtifactType::from(*c)).collect();
        d
    }

    fn registry(
        ws: &Workspace,
        classes: &ClassTable,
        descriptors: Vec<TransformerDescriptor>,
        qa: Arc<QuestionBridge>,
    ) -> TransformerRegistry {
        TransformerRegistry::from_descriptors(descriptors, classes, ws, "shop", qa, &BTreeSet::new())
            .unwrap()
    }

    fn service(name: &str) -> Artifact {
        Artifact::new(name, ArtifactType::SERVICE).with_config(ServiceConfig {
            service_name: name.to_string(),
        })
    }

    #[tokio::test]
    async fn test_empty_seeds_converge_without_rounds() {
        let src = TempDir::new().unwrap();
        let ws = Workspace::in_place(src.path(), 0o644, 0o755).unwrap();
        let qa = Arc::new(QuestionBridge::with_defaults());
        let reg = registry(&ws, &ClassTable::with_defaults(), Vec::new(), qa.clone());

        let run = TransformEngine::new(&reg, qa, "shop").run(Vec::new()).await.unwrap();
        assert_eq!(run.rounds, 0);
        assert!(run.mappings.is_empty());
        assert!(run.seen.is_empty());
    }

    #[tokio::test]
    async fn test_round_limit_aborts_with_mappings_kept() {
        let src = TempDir::new().unwrap();
        let ws = Workspace::in_place(src.path(), 0o644, 0o755).unwrap();
        let qa = Arc::new(QuestionBridge::with_defaults());
        let mut classes = ClassTable::new();
        classes.register("Spinner", || Box::new(Spinner));
        let reg = registry(&ws, &classes, vec![descriptor("spin", "Spinner", 0, &[TICK])], qa.clone());

        let aborted = TransformEngine::new(&reg, qa, "shop")
            .with_max_rounds(5)
            .run(vec![Artifact::new("tick", TICK)])
            .await
            .unwrap_err();
        assert!(matches!(
            aborted.error,
            PipelineError::TransformNotConverged { rounds: 5 }
        ));
        assert_eq!(aborted.error.exit_code(), 3);
        assert_eq!(aborted.run.seen.len(), 5);
    }

    #[tokio::test]
    async fn test_repeated_artifact_is_seen_once() {
        let src = TempDir::new().unwrap();
        let ws = Workspace::in_place(src.path(), 0o644, 0o755).unwrap();
        let qa = Arc::new(QuestionBridge::with_defaults());
        let mut classes = ClassTable::new();
        classes.register("Repeater", || Box::new(Repeater));
        let reg = registry(
            &ws,
            &classes,
            vec![descriptor("repeat", "Repeater", 0, &[ArtifactType::SERVICE, "Echo"])],
            qa.clone(),
        );

        let run = TransformEngine::new(&reg, qa, "shop")
            .run(vec![service("web")])
            .await
            .unwrap();
        // round 1 emits Echo, round 2 re-emits it and the copy is dropped
        assert_eq!(run.rounds, 2);
        assert_eq!(run.seen.len(), 2);
        assert_eq!(run.mappings.len(), 2);
    }

    #[test]
    fn test_conflicting_payload_under_same_key() {
        let mut bus = Bus::default();
        let a = Artifact::new("web", "Echo");
        assert!(bus.admit(&a).unwrap());
        assert!(!bus.admit(&a).unwrap());

        bus.payloads.insert(a.key(), "{\"tampered\":true}".to_string());
        let err = bus.admit(&a).unwrap_err();
        assert!(matches!(err, PipelineError::DedupConflict { .. }));
        assert!(err.emits_partial());
    }

    #[tokio::test]
    async fn test_priority_order_and_seen_includes_current_round() {
        let src = TempDir::new().unwrap();
        let ws = Workspace::in_place(src.path(), 0o644, 0o755).unwrap();
        let qa = Arc::new(QuestionBridge::with_defaults());
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut classes = ClassTable::new();
        let l = log.clone();
        classes.register("Recorder", move || {
            Box::new(Recorder {
                log: l.clone(),
                fail: false,
            })
        });
        let l = log.clone();
        classes.register("Failing", move || {
            Box::new(Recorder {
                log: l.clone(),
                fail: true,
            })
        });
        let reg = registry(
            &ws,
            &classes,
            vec![
                descriptor("low", "Recorder", 1, &[ArtifactType::SERVICE]),
                descriptor("high", "Recorder", 9, &[ArtifactType::SERVICE]),
                descriptor("broken", "Failing", 5, &[ArtifactType::SERVICE]),
                descriptor("bystander", "Recorder", 9, &["Other"]),
            ],
            qa.clone(),
        );

        let run = TransformEngine::new(&reg, qa, "shop")
            .run(vec![service("a"), service("b")])
            .await
            .unwrap();
        assert_eq!(run.rounds, 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("high".to_string(), 2),
                ("broken".to_string(), 2),
                ("low".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_ir_is_refined_before_delivery() {
        let src = TempDir::new().unwrap();
        let ws = Workspace::in_place(src.path(), 0o644, 0o755).unwrap();
        let qa = Arc::new(QuestionBridge::with_defaults());
        let replicas = Arc::new(Mutex::new(Vec::new()));
        let mut classes = ClassTable::new();
        classes.register("IrEmitter", || Box::new(IrEmitter));
        let r = replicas.clone();
        classes.register("IrSink", move || Box::new(IrSink { replicas: r.clone() }));
        let reg = registry(
            &ws,
            &classes,
            vec![
                descriptor("emit", "IrEmitter", 5, &[ArtifactType::SERVICE]),
                descriptor("sink", "IrSink", 1, &[ArtifactType::IR]),
            ],
            qa.clone(),
        );

        let run = TransformEngine::new(&reg, qa, "shop")
            .run(vec![service("web")])
            .await
            .unwrap();
        assert_eq!(run.rounds, 2);
        assert_eq!(*replicas.lock().unwrap(), vec![Some(crate::ir::preprocess::DEFAULT_REPLICAS)]);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_round() {
        let src = TempDir::new().unwrap();
        let ws = Workspace::in_place(src.path(), 0o644, 0o755).unwrap();
        let qa = Arc::new(QuestionBridge::with_defaults());
        qa.cancel_token().cancel();
        let reg = registry(&ws, &ClassTable::with_defaults(), Vec::new(), qa.clone());

        let aborted = TransformEngine::new(&reg, qa, "shop")
            .run(vec![service("web")])
            .await
            .unwrap_err();
        assert!(matches!(aborted.error, PipelineError::Cancelled));
        assert_eq!(aborted.run.rounds, 0);
    }
}
