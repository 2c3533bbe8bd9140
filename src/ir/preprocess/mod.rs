//! IR refinements applied before manifests are emitted
//!
//! The chain is fixed and ordered. Every step must be idempotent: running the
//! chain on its own output yields the same IR.

mod env;
mod ingress;
mod registry;
mod replicas;
mod service_account;
mod storage;

pub use env::EnvPreprocessor;
pub use ingress::IngressPreprocessor;
pub use registry::RegistryPreprocessor;
pub use replicas::{ReplicasPreprocessor, DEFAULT_REPLICAS};
pub use service_account::ServiceAccountPreprocessor;
pub use storage::{StoragePreprocessor, DEFAULT_STORAGE_SIZE};

use super::Ir;
use crate::error::PipelineError;
use crate::qa::QuestionBridge;
use tracing::debug;

pub trait IrPreprocessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn preprocess(&self, ir: Ir, qa: &QuestionBridge) -> Result<Ir, PipelineError>;
}

pub struct PreprocessorChain {
    steps: Vec<Box<dyn IrPreprocessor>>,
}

impl PreprocessorChain {
    /// The standard chain; `project` names the default registry namespace
    pub fn standard(project: &str) -> Self {
        Self {
            steps: vec![
                Box::new(IngressPreprocessor),
                Box::new(ReplicasPreprocessor::default()),
                Box::new(EnvPreprocessor),
                Box::new(ServiceAccountPreprocessor),
                Box::new(RegistryPreprocessor::new(project)),
                Box::new(StoragePreprocessor::default()),
            ],
        }
    }

    pub fn from_steps(steps: Vec<Box<dyn IrPreprocessor>>) -> Self {
        Self { steps }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, mut ir: Ir, qa: &QuestionBridge) -> Result<Ir, PipelineError> {
        for step in &self.steps {
            ir = step.preprocess(ir, qa)?;
            debug!(preprocessor = step.name(), services = ir.services.len(), "IR preprocessed");
        }
        Ok(ir)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::ir::*;

    pub fn web_ir() -> Ir {
        let mut ir = Ir::new("shop");
        let mut web = Service::new("web");
        web.containers.push(Container {
            name: "web".into(),
            image: "web:latest".into(),
            new_image: true,
            ports: vec![ContainerPort::tcp(8080)],
            env: vec![
                EnvVar::new("HOST", "0.0.0.0"),
                EnvVar::new("URL", "http://${HOST}:${PORT}"),
                EnvVar::new("PORT", "8080"),
            ],
            volume_mounts: vec![VolumeMount {
                name: "data".into(),
                mount_path: "/data".into(),
                read_only: false,
            }],
            ..Default::default()
        });
        web.containers.push(Container {
            name: "cache".into(),
            image: "redis:7".into(),
            ..Default::default()
        });
        web.service_to_pod_port_forwardings
            .push(PortForwarding::new(80, 8080));
        web.service_to_pod_port_forwardings
            .push(PortForwarding::new(0, 9090));
        web.volumes.push(Volume {
            name: "data".into(),
            kind: VolumeKind::PersistentVolumeClaim {
                claim_name: "web-data".into(),
            },
        });
        web.volumes.push(Volume {
            name: "tmp".into(),
            kind: VolumeKind::EmptyDir,
        });
        ir.add_service(web);
        ir
    }
}
