use super::IrPreprocessor;
use crate::error::PipelineError;
use crate::ir::Ir;
use crate::qa::QuestionBridge;

pub const DEFAULT_REPLICAS: u32 = 2;

/// Gives every service a concrete replica count
pub struct ReplicasPreprocessor {
    pub default_replicas: u32,
}

impl Default for ReplicasPreprocessor {
    fn default() -> Self {
        Self {
            default_replicas: DEFAULT_REPLICAS,
        }
    }
}

impl IrPreprocessor for ReplicasPreprocessor {
    fn name(&self) -> &'static str {
        "replicas"
    }

    fn preprocess(&self, mut ir: Ir, _qa: &QuestionBridge) -> Result<Ir, PipelineError> {
        for service in ir.services.values_mut() {
            if service.replicas.is_none() {
                service.replicas = Some(self.default_replicas);
            }
        }
        Ok(ir)
    }
}
