//! Built-in transformer classes

mod build_script;
mod dockerfile_detector;
mod dockerfile_service_ir;
mod jboss;
mod kubernetes;
mod nodejs;
pub mod parameterizer;
mod push_script;
mod readme;
mod s2i;
mod war_analyser;

pub use build_script::DockerfileImageBuildScript;
pub use dockerfile_detector::DockerfileDetector;
pub use dockerfile_service_ir::DockerfileServiceIr;
pub use jboss::Jboss;
pub use kubernetes::Kubernetes;
pub use nodejs::NodejsDockerfileGenerator;
pub use parameterizer::Parameterizer;
pub use push_script::ContainerImagesPushScript;
pub use readme::ReadMeGenerator;
pub use s2i::S2IGenerator;
pub use war_analyser::WarAnalyser;

use super::image_name_compliant;
use crate::artifact::{Artifact, ArtifactType, ExposedPorts, ImageName, PathType, ServiceConfig};
use crate::environment::paths::absolute;
use crate::environment::Environment;
use crate::ir::Ir;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output subdirectory mirroring the user's source
pub const SOURCE_DIR: &str = "source";
pub const SCRIPTS_DIR: &str = "scripts";
pub const DEPLOY_DIR: &str = "deploy";
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// `path` relative to the environment's source root, or `None` when it lies
/// elsewhere
pub(crate) fn relative_to_source(env: &Environment, path: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(env.source()) {
        return Some(rel.to_path_buf());
    }
    absolute(path)
        .strip_prefix(absolute(env.source()))
        .ok()
        .map(Path::to_path_buf)
}

/// Image name carried by the artifact, or one derived from `fallback`
pub(crate) fn image_name_of(artifact: &Artifact, fallback: &str) -> ImageName {
    let mut image = match artifact.config::<ImageName>() {
        Ok(image) => image,
        Err(e) => {
            debug!(artifact = %artifact.name, error = %e, "No image name config");
            ImageName::default()
        }
    };
    if image.image_name.is_empty() {
        image.image_name = image_name_compliant(fallback);
    }
    image
}

/// IR carried by the artifact, if any
pub(crate) fn ir_of(artifact: &Artifact) -> Option<Ir> {
    match artifact.config::<Ir>() {
        Ok(ir) => Some(ir),
        Err(e) => {
            debug!(artifact = %artifact.name, error = %e, "No IR config");
            None
        }
    }
}

/// The `Dockerfile` and `DockerfileForService` artifacts every Dockerfile
/// producing transformer emits for a service
pub(crate) fn dockerfile_artifacts(
    service_artifact: &Artifact,
    service: &ServiceConfig,
    image: &ImageName,
    dockerfile: PathBuf,
    context: Option<PathBuf>,
    ports: &[u16],
) -> [Artifact; 2] {
    let mut dockerfile_artifact = Artifact::new(&image.image_name, ArtifactType::DOCKERFILE);
    dockerfile_artifact.paths = service_artifact.paths.clone();
    dockerfile_artifact.set_paths(PathType::DOCKERFILE, vec![dockerfile]);
    if let Some(context) = context {
        dockerfile_artifact.set_paths(PathType::DOCKERFILE_CONTEXT, vec![context]);
    }
    dockerfile_artifact.set_config(image.clone());

    let mut for_service = Artifact::new(&service.service_name, ArtifactType::DOCKERFILE_FOR_SERVICE);
    for_service.paths = service_artifact.paths.clone();
    for_service.set_config(image.clone());
    for_service.set_config(service.clone());
    if !ports.is_empty() {
        for_service.set_config(ExposedPorts {
            ports: ports.to_vec(),
        });
    }
    if let Some(ir) = ir_of(service_artifact) {
        for_service.set_config(ir);
    }

    [dockerfile_artifact, for_service]
}

#[cfg(test)]
pub(crate) mod testing {
    //! Sandbox fixtures for exercising a single transformer class

    use super::super::{TransformOutput, Transformer, TransformerConfig, TransformerDescriptor};
    use crate::artifact::{Artifact, ArtifactType, PathType, ServiceConfig};
    use crate::environment::Workspace;
    use crate::qa::QuestionBridge;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    pub struct Harness {
        pub source: TempDir,
        pub context: TempDir,
        pub workspace: Workspace,
        pub config: TransformerConfig,
    }

    impl Harness {
        /// `prepare` fills the source tree before it is snapshotted
        pub fn new(
            descriptor: TransformerDescriptor,
            qa: QuestionBridge,
            prepare: impl FnOnce(&Path),
        ) -> Self {
            let source = TempDir::new().unwrap();
            prepare(source.path());
            let context = TempDir::new().unwrap();
            std::fs::create_dir_all(context.path().join("templates")).unwrap();
            let workspace = Workspace::snapshot(source.path(), 0o644, 0o755).unwrap();
            let env = workspace
                .environment(
                    &descriptor.name,
                    context.path(),
                    &descriptor.spec.templates_dir,
                    "proj",
                    Arc::new(qa),
                )
                .unwrap();
            let mut descriptor = descriptor;
            descriptor.dir = context.path().to_path_buf();
            Self {
                source,
                context,
                workspace,
                config: TransformerConfig { descriptor, env },
            }
        }

        /// Service seed artifact pointing at `rel` inside the snapshot
        pub fn service(&self, name: &str, rel: &str) -> Artifact {
            Artifact::new(name, ArtifactType::SERVICE)
                .with_path(PathType::SERVICE_DIR, self.workspace.source().join(rel))
                .with_config(ServiceConfig {
                    service_name: name.to_string(),
                })
        }

        pub async fn run(
            &self,
            transformer: &mut dyn Transformer,
            new: &[Artifact],
            seen: &[Artifact],
        ) -> TransformOutput {
            transformer.init(&self.config).unwrap();
            self.config.env.begin_invocation().unwrap();
            transformer.transform(&self.config, new, seen).await.unwrap()
        }
    }
}
