use super::IrPreprocessor;
use crate::error::PipelineError;
use crate::ir::Ir;
use crate::qa::QuestionBridge;

/// Services without a service account run under one named after them
pub struct ServiceAccountPreprocessor;

impl IrPreprocessor for ServiceAccountPreprocessor {
    fn name(&self) -> &'static str {
        "serviceaccount"
    }

    fn preprocess(&self, mut ir: Ir, _qa: &QuestionBridge) -> Result<Ir, PipelineError> {
        for (name, service) in ir.services.iter_mut() {
            if service.service_account_name.is_empty() {
                service.service_account_name = name.clone();
            }
        }
        Ok(ir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::preprocess::fixtures::web_ir;

    #[test]
    fn test_defaults_to_service_name() {
        let qa = QuestionBridge::with_defaults();
        let once = ServiceAccountPreprocessor.preprocess(web_ir(), &qa).unwrap();
        assert_eq!(once.services["web"].service_account_name, "web");
        let twice = ServiceAccountPreprocessor
            .preprocess(once.clone(), &qa)
            .unwrap();
        assert_eq!(once, twice);
    }
}
