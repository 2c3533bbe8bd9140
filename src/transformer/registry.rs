//! Class table and loaded transformer registry

use super::classes;
use super::descriptor::{self, TransformerDescriptor};
use super::{DetectedServices, TransformOutput, Transformer, TransformerConfig};
use crate::artifact::{Artifact, ArtifactType};
use crate::config::RuntimeConfig;
use crate::environment::{Environment, Workspace};
use crate::error::PipelineError;
use crate::qa::QuestionBridge;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub type TransformerFactory = Arc<dyn Fn() -> Box<dyn Transformer> + Send + Sync>;

/// Maps a descriptor's `class` to a constructor
#[derive(Clone, Default)]
pub struct ClassTable {
    factories: BTreeMap<String, TransformerFactory>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register("NodejsDockerfileGenerator", || {
            Box::new(classes::NodejsDockerfileGenerator::default())
        });
        table.register("DockerfileDetector", || Box::new(classes::DockerfileDetector));
        table.register("WarAnalyser", || Box::new(classes::WarAnalyser::default()));
        table.register("Jboss", || Box::new(classes::Jboss::default()));
        table.register("S2IGenerator", || Box::new(classes::S2IGenerator::default()));
        table.register("DockerfileImageBuildScript", || {
            Box::new(classes::DockerfileImageBuildScript)
        });
        table.register("ContainerImagesPushScript", || {
            Box::new(classes::ContainerImagesPushScript)
        });
        table.register("DockerfileServiceIr", || Box::new(classes::DockerfileServiceIr));
        table.register("Kubernetes", || Box::new(classes::Kubernetes));
        table.register("Parameterizer", || Box::new(classes::Parameterizer::default()));
        table.register("ReadMeGenerator", || Box::new(classes::ReadMeGenerator));
        table
    }

    pub fn register<F>(&mut self, class: &str, factory: F)
    where
        F: Fn() -> Box<dyn Transformer> + Send + Sync + 'static,
    {
        self.factories.insert(class.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    pub fn create(&self, class: &str) -> Option<Box<dyn Transformer>> {
        self.factories.get(class).map(|factory| factory())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// An initialized transformer with its descriptor and sandbox
pub struct LoadedTransformer {
    config: TransformerConfig,
    transformer: Box<dyn Transformer>,
}

impl LoadedTransformer {
    pub fn name(&self) -> &str {
        &self.config.descriptor.name
    }

    pub fn priority(&self) -> i32 {
        self.config.descriptor.spec.priority
    }

    pub fn config(&self) -> (&TransformerDescriptor, &Environment) {
        (&self.config.descriptor, &self.config.env)
    }

    /// Whether `artifact` should be delivered to this transformer
    pub fn accepts(&self, artifact: &Artifact) -> bool {
        if let Some(target) = &artifact.process_with {
            if target != self.name() {
                return false;
            }
        }
        self.config.descriptor.consumes(&artifact.artifact_type)
    }

    pub fn produces(&self, artifact_type: &ArtifactType) -> bool {
        self.config.descriptor.spec.produces.contains(artifact_type)
    }

    pub async fn directory_detect(&self, dir: &Path) -> Result<DetectedServices, PipelineError> {
        self.transformer.directory_detect(&self.config, dir).await
    }

    /// Runs one invocation against a fresh output scratch
    pub async fn transform(
        &self,
        new: &[Artifact],
        seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        self.config.env.check_cancelled()?;
        self.config.env.begin_invocation()?;
        self.transformer.transform(&self.config, new, seen).await
    }
}

impl std::fmt::Debug for LoadedTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedTransformer")
            .field("name", &self.name())
            .field("class", &self.config.descriptor.class)
            .field("priority", &self.priority())
            .finish()
    }
}

/// Initialized transformers in invocation order: priority descending, then
/// name ascending
#[derive(Debug, Default)]
pub struct TransformerRegistry {
    transformers: Vec<LoadedTransformer>,
}

impl TransformerRegistry {
    /// Discovers descriptors under the configured directories and
    /// instantiates them.
    ///
    /// `selected` names transformers the plan depends on. For those an
    /// unknown class is fatal; for everything else it is only logged.
    pub fn load(
        config: &RuntimeConfig,
        classes: &ClassTable,
        workspace: &Workspace,
        qa: Arc<QuestionBridge>,
        selected: &BTreeSet<String>,
    ) -> Result<Self, PipelineError> {
        let descriptors = descriptor::discover(&config.transformer_dirs);
        info!(count = descriptors.len(), "Transformer descriptors discovered");
        Self::from_descriptors(descriptors, classes, workspace, &config.project_name, qa, selected)
    }

    pub fn from_descriptors(
        descriptors: Vec<TransformerDescriptor>,
        classes: &ClassTable,
        workspace: &Workspace,
        project_name: &str,
        qa: Arc<QuestionBridge>,
        selected: &BTreeSet<String>,
    ) -> Result<Self, PipelineError> {
        let mut transformers = Vec::new();

        for descriptor in descriptors {
            let Some(mut transformer) = classes.create(&descriptor.class) else {
                if selected.contains(&descriptor.name) {
                    return Err(PipelineError::UnknownTransformerClass {
                        name: descriptor.name,
                        class: descriptor.class,
                    });
                }
                warn!(
                    transformer = %descriptor.name,
                    class = %descriptor.class,
                    "Unknown transformer class, skipping"
                );
                continue;
            };

            let env = workspace.environment(
                &descriptor.name,
                &descriptor.dir,
                &descriptor.spec.templates_dir,
                project_name,
                qa.clone(),
            )?;
            let config = TransformerConfig { descriptor, env };

            if let Err(e) = transformer.init(&config) {
                error!(transformer = %config.name(), error = %e, "Transformer init failed, skipping");
                continue;
            }
            debug!(transformer = %config.name(), class = %config.descriptor.class, "Transformer loaded");
            transformers.push(LoadedTransformer { config, transformer });
        }

        for name in selected {
            if !transformers.iter().any(|t| t.name() == name) {
                return Err(PipelineError::InvalidInput(format!(
                    "plan selects transformer {} which is not available",
                    name
                )));
            }
        }

        transformers.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        Ok(Self { transformers })
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedTransformer> {
        self.transformers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&LoadedTransformer> {
        self.transformers.iter().find(|t| t.name() == name)
    }

    /// Context directories of the loaded transformers; their templates and
    /// bundled files are valid mapping sources
    pub fn context_dirs(&self) -> Vec<PathBuf> {
        self.transformers
            .iter()
            .map(|t| t.config.env.context().to_path_buf())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl Transformer for Echo {
        async fn transform(
            &self,
            _config: &TransformerConfig,
            _new: &[Artifact],
            _seen: &[Artifact],
        ) -> Result<TransformOutput, PipelineError> {
            Ok(TransformOutput::default())
        }
    }

    struct FailsInit;

    #[async_trait]
    impl Transformer for FailsInit {
        fn init(&mut self, _config: &TransformerConfig) -> Result<(), PipelineError> {
            Err(PipelineError::InvalidInput("bad config".into()))
        }

        async fn transform(
            &self,
            _config: &TransformerConfig,
            _new: &[Artifact],
            _seen: &[Artifact],
        ) -> Result<TransformOutput, PipelineError> {
            Ok(TransformOutput::default())
        }
    }

    fn descriptor(name: &str, class: &str, priority: i32) -> TransformerDescriptor {
        let mut d = TransformerDescriptor::new(name, class);
        d.spec.priority = priority;
        d.spec.consumes = vec![ArtifactType::from(ArtifactType::SERVICE)];
        d
    }

    fn table() -> ClassTable {
        let mut classes = ClassTable::new();
        classes.register("Echo", || Box::new(Echo));
        classes.register("FailsInit", || Box::new(FailsInit));
        classes
    }

    fn load(
        descriptors: Vec<TransformerDescriptor>,
        selected: &[&str],
    ) -> Result<TransformerRegistry, PipelineError> {
        let src = TempDir::new().unwrap();
        let ws = Workspace::in_place(src.path(), 0o644, 0o755).unwrap();
        let selected = selected.iter().map(|s| s.to_string()).collect();
        TransformerRegistry::from_descriptors(
            descriptors,
            &table(),
            &ws,
            "proj",
            Arc::new(QuestionBridge::with_defaults()),
            &selected,
        )
    }

    #[test]
    fn test_priority_then_name_order() {
        let registry = load(
            vec![
                descriptor("b", "Echo", 0),
                descriptor("a", "Echo", 0),
                descriptor("z", "Echo", 10),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(registry.names(), vec!["z", "a", "b"]);
    }

    #[test]
    fn test_unknown_class_skipped_unless_selected() {
        let registry = load(vec![descriptor("x", "Nope", 0)], &[]).unwrap();
        assert!(registry.is_empty());

        let err = load(vec![descriptor("x", "Nope", 0)], &["x"]).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTransformerClass { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_init_failure_removes_transformer() {
        let registry = load(
            vec![descriptor("ok", "Echo", 0), descriptor("bad", "FailsInit", 0)],
            &[],
        )
        .unwrap();
        assert_eq!(registry.names(), vec!["ok"]);
    }

    #[test]
    fn test_accepts_honors_process_with() {
        let registry = load(vec![descriptor("a", "Echo", 0), descriptor("b", "Echo", 0)], &[]).unwrap();
        let artifact = Artifact::new("web", ArtifactType::SERVICE).process_with("b");
        assert!(!registry.get("a").unwrap().accepts(&artifact));
        assert!(registry.get("b").unwrap().accepts(&artifact));
        assert!(!registry
            .get("a")
            .unwrap()
            .accepts(&Artifact::new("web", ArtifactType::IR)));
    }

    #[test]
    fn test_default_table_has_builtin_classes() {
        let classes = ClassTable::with_defaults();
        for class in [
            "NodejsDockerfileGenerator",
            "DockerfileDetector",
            "WarAnalyser",
            "Jboss",
            "S2IGenerator",
            "DockerfileImageBuildScript",
            "ContainerImagesPushScript",
            "DockerfileServiceIr",
            "Kubernetes",
            "Parameterizer",
            "ReadMeGenerator",
        ] {
            assert!(classes.contains(class), "missing {}", class);
        }
    }
}
