//! Turns a service with a Dockerfile into a deployable IR service

use super::{image_name_of, ir_of};
use crate::artifact::{Artifact, ArtifactType, ExposedPorts, ServiceConfig};
use crate::error::PipelineError;
use crate::ir::{Container, ContainerPort, Ir, PortForwarding, Service};
use crate::transformer::{TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use tracing::{debug, error};

pub struct DockerfileServiceIr;

fn ports_of(artifact: &Artifact, ir: Option<&Ir>) -> Vec<u16> {
    match artifact.config::<ExposedPorts>() {
        Ok(exposed) if !exposed.ports.is_empty() => exposed.ports,
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!(artifact = %artifact.name, error = %e, "No exposed ports config");
            ir.map(|ir| ir.services.values().flat_map(|s| s.container_ports()).collect())
                .unwrap_or_default()
        }
    }
}

#[async_trait]
impl Transformer for DockerfileServiceIr {
    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        _seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let mut output = TransformOutput::default();

        for artifact in new {
            env.check_cancelled()?;
            let service_config: ServiceConfig = match artifact.config() {
                Ok(service) => service,
                Err(e) => {
                    error!(transformer = %config.name(), artifact = %artifact.name, error = %e, "Missing service config");
                    continue;
                }
            };
            let name = &service_config.service_name;
            let image = image_name_of(artifact, name);
            let carried = ir_of(artifact);
            let ports = ports_of(artifact, carried.as_ref());

            let mut ir = carried.unwrap_or_else(|| Ir::new(env.project_name()));
            if ir.name.is_empty() {
                ir.name = env.project_name().to_string();
            }
            let mut service = ir.services.remove(name).unwrap_or_else(|| Service::new(name));
            let container = Container {
                name: name.clone(),
                image: format!("{}:latest", image.image_name),
                new_image: true,
                ports: ports.iter().copied().map(ContainerPort::tcp).collect(),
                ..Default::default()
            };
            match service.containers.iter_mut().find(|c| c.name == container.name) {
                Some(existing) => {
                    existing.image = container.image;
                    existing.new_image = true;
                    for port in container.ports {
                        if !existing.ports.contains(&port) {
                            existing.ports.push(port);
                        }
                    }
                }
                None => service.containers.push(container),
            }
            for port in &ports {
                if !service
                    .service_to_pod_port_forwardings
                    .iter()
                    .any(|f| f.pod_port.number == *port)
                {
                    service
                        .service_to_pod_port_forwardings
                        .push(PortForwarding::new(*port, *port));
                }
            }
            ir.add_service(service);

            output
                .artifacts
                .push(Artifact::new(name, ArtifactType::IR).with_config(ir));
        }

        Ok(output)
    }
}
