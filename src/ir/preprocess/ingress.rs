use super::IrPreprocessor;
use crate::error::PipelineError;
use crate::ir::Ir;
use crate::qa::common::{quote, service_key};
use crate::qa::QuestionBridge;

const HINTS: &[&str] = &[
    "Enter :- to not create service for the port",
    "For Ingress path, leave out leading / to use first part as subdomain",
    "Add :N as suffix for NodePort service type",
    "Add :L for Load Balancer service type",
    "Add :C for ClusterIP service type",
];

/// Asks how each forwarded service port is exposed and records the answer
/// as the forwarding's relative path. Pass-through forwardings (service port
/// 0) are never asked about.
pub struct IngressPreprocessor;

impl IrPreprocessor for IngressPreprocessor {
    fn name(&self) -> &'static str {
        "ingress"
    }

    fn preprocess(&self, mut ir: Ir, qa: &QuestionBridge) -> Result<Ir, PipelineError> {
        for (name, service) in ir.services.iter_mut() {
            for forwarding in service.service_to_pod_port_forwardings.iter_mut() {
                if forwarding.service_port.number == 0 {
                    continue;
                }
                let port = forwarding.service_port.number.to_string();
                let key = service_key(name, &[&quote(&port), "urlpath"]);
                let message = format!(
                    "What kind of service/ingress to create for {}'s {} port?",
                    name, port
                );
                let default = if forwarding.service_rel_path.is_empty() {
                    format!("/{}", name)
                } else {
                    forwarding.service_rel_path.clone()
                };
                let answer = qa.fetch_string(&key, &message, HINTS, &default)?;
                forwarding.service_rel_path = answer.trim().to_string();
            }
        }
        Ok(ir)
    }
}
