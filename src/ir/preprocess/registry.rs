use super::IrPreprocessor;
use crate::error::PipelineError;
use crate::ir::Ir;
use crate::qa::{common, QuestionBridge};

/// Prefixes images built by the generated scripts with the target registry
/// and namespace. Pulled images are left alone.
pub struct RegistryPreprocessor {
    project: String,
}

impl RegistryPreprocessor {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }
}

impl IrPreprocessor for RegistryPreprocessor {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn preprocess(&self, mut ir: Ir, qa: &QuestionBridge) -> Result<Ir, PipelineError> {
        let has_new_images = ir
            .services
            .values()
            .flat_map(|s| s.containers.iter())
            .any(|c| c.new_image);
        if !has_new_images {
            return Ok(ir);
        }

        let url = common::registry_url(qa)?;
        let namespace = common::registry_namespace(qa, &self.project)?;
        let prefix = if namespace.is_empty() {
            format!("{}/", url)
        } else {
            format!("{}/{}/", url, namespace)
        };

        for service in ir.services.values_mut() {
            for container in service.containers.iter_mut() {
                if !container.new_image || container.image.starts_with(&prefix) {
                    continue;
                }
                let bare = container
                    .image
                    .rsplit('/')
                    .next()
                    .unwrap_or(&container.image)
                    .to_string();
                container.image = format!("{}{}", prefix, bare);
            }
        }
        Ok(ir)
    }
}
