//! Plain Kubernetes manifests from the merged IR
//!
//! Every invocation merges all IR artifacts seen so far and rewrites the
//! full manifest set, so the last invocation's output is complete.

use super::DEPLOY_DIR;
use crate::artifact::{Artifact, ArtifactType, PathMapping, PathType};
use crate::error::PipelineError;
use crate::ir::{Ir, Service, ServiceType, StorageKind, VolumeKind};
use crate::qa::common::ingress_host;
use crate::transformer::{TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const YAMLS_DIR: &str = "yamls";
const APP_LABEL: &str = "kubelift.io/service";

pub struct Kubernetes;

fn selector(service: &str) -> Value {
    json!({ APP_LABEL: service })
}

fn deployment(service: &Service) -> Value {
    let containers: Vec<Value> = service
        .containers
        .iter()
        .map(|c| {
            let mut container = json!({
                "name": c.name,
                "image": c.image,
                "imagePullPolicy": "Always",
            });
            if !c.ports.is_empty() {
                container["ports"] = json!(c
                    .ports
                    .iter()
                    .map(|p| json!({"containerPort": p.container_port, "protocol": p.protocol}))
                    .collect::<Vec<_>>());
            }
            if !c.env.is_empty() {
                container["env"] = json!(c
                    .env
                    .iter()
                    .map(|e| json!({"name": e.name, "value": e.value}))
                    .collect::<Vec<_>>());
            }
            if !c.volume_mounts.is_empty() {
                container["volumeMounts"] = json!(c
                    .volume_mounts
                    .iter()
                    .map(|m| json!({"name": m.name, "mountPath": m.mount_path, "readOnly": m.read_only}))
                    .collect::<Vec<_>>());
            }
            if !c.command.is_empty() {
                container["command"] = json!(c.command);
            }
            if !c.args.is_empty() {
                container["args"] = json!(c.args);
            }
            for (field, probe) in [("livenessProbe", &c.liveness_probe), ("readinessProbe", &c.readiness_probe)] {
                if let Some(probe) = probe {
                    let action = match &probe.http_get_path {
                        Some(path) => json!({"httpGet": {"path": path, "port": probe.port}}),
                        None => json!({"tcpSocket": {"port": probe.port}}),
                    };
                    let mut value = action;
                    value["initialDelaySeconds"] = json!(probe.initial_delay_seconds);
                    value["periodSeconds"] = json!(probe.period_seconds);
                    container[field] = value;
                }
            }
            container
        })
        .collect();

    let volumes: Vec<Value> = service
        .volumes
        .iter()
        .map(|v| match &v.kind {
            VolumeKind::EmptyDir => json!({"name": v.name, "emptyDir": {}}),
            VolumeKind::PersistentVolumeClaim { claim_name } => {
                json!({"name": v.name, "persistentVolumeClaim": {"claimName": claim_name}})
            }
            VolumeKind::ConfigMap { name } => json!({"name": v.name, "configMap": {"name": name}}),
            VolumeKind::Secret { name } => json!({"name": v.name, "secret": {"secretName": name}}),
            VolumeKind::HostPath { path } => json!({"name": v.name, "hostPath": {"path": path}}),
        })
        .collect();

    let mut labels: BTreeMap<String, String> = service.labels.clone();
    labels.insert(APP_LABEL.to_string(), service.name.clone());

    let mut pod_spec = json!({ "containers": containers });
    if !volumes.is_empty() {
        pod_spec["volumes"] = json!(volumes);
    }
    if !service.service_account_name.is_empty() {
        pod_spec["serviceAccountName"] = json!(service.service_account_name);
    }

    let mut metadata = json!({"name": service.name, "labels": labels});
    if !service.annotations.is_empty() {
        metadata["annotations"] = json!(service.annotations);
    }

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata,
        "spec": {
            "replicas": service.replicas.unwrap_or(1),
            "selector": {"matchLabels": selector(&service.name)},
            "template": {
                "metadata": {"labels": labels},
                "spec": pod_spec,
            },
        },
    })
}

/// One Service object per exposure type the forwardings ask for
fn services(service: &Service) -> Vec<Value> {
    let mut by_type: BTreeMap<&'static str, Vec<Value>> = BTreeMap::new();
    for forwarding in &service.service_to_pod_port_forwardings {
        if forwarding.service_port.number == 0 {
            continue;
        }
        let Some(service_type) = forwarding.exposure().service_type else {
            continue;
        };
        let name = if forwarding.service_port.name.is_empty() {
            format!("port-{}", forwarding.service_port.number)
        } else {
            forwarding.service_port.name.clone()
        };
        by_type.entry(service_type.as_str()).or_default().push(json!({
            "name": name,
            "port": forwarding.service_port.number,
            "targetPort": forwarding.pod_port.number,
        }));
    }

    by_type
        .into_iter()
        .map(|(service_type, ports)| {
            let name = if service_type == ServiceType::ClusterIP.as_str() {
                service.name.clone()
            } else {
                format!("{}-{}", service.name, service_type.to_lowercase())
            };
            json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": {"name": name, "labels": selector(&service.name)},
                "spec": {
                    "type": service_type,
                    "selector": selector(&service.name),
                    "ports": ports,
                },
            })
        })
        .collect()
}

fn ingress(ir: &Ir, host: &str) -> Option<Value> {
    let mut rules: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for service in ir.services.values() {
        for forwarding in &service.service_to_pod_port_forwardings {
            if forwarding.service_port.number == 0 {
                continue;
            }
            let exposure = forwarding.exposure();
            let Some(path) = exposure.ingress_path else {
                continue;
            };
            let rule_host = match &exposure.subdomain {
                Some(sub) => format!("{}.{}", sub, host),
                None => host.to_string(),
            };
            rules.entry(rule_host).or_default().push(json!({
                "path": path,
                "pathType": "Prefix",
                "backend": {"service": {
                    "name": service.name,
                    "port": {"number": forwarding.service_port.number},
                }},
            }));
        }
    }
    if rules.is_empty() {
        return None;
    }
    let rules: Vec<Value> = rules
        .into_iter()
        .map(|(host, paths)| json!({"host": host, "http": {"paths": paths}}))
        .collect();
    Some(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": {"name": ir.name},
        "spec": {"rules": rules},
    }))
}

/// Manifests for an IR, keyed by file name
pub(crate) fn manifests(ir: &Ir, host: &str) -> BTreeMap<String, Value> {
    let mut files = BTreeMap::new();
    for service in ir.services.values() {
        files.insert(format!("{}-deployment.yaml", service.name), deployment(service));
        for object in services(service) {
            let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
            files.insert(format!("{}-service.yaml", name), object);
        }
    }
    if let Some(ingress) = ingress(ir, host) {
        files.insert(format!("{}-ingress.yaml", ir.name), ingress);
    }
    for storage in &ir.storages {
        match storage.kind {
            StorageKind::PersistentVolumeClaim => {
                files.insert(
                    format!("{}-persistentvolumeclaim.yaml", storage.name),
                    json!({
                        "apiVersion": "v1",
                        "kind": "PersistentVolumeClaim",
                        "metadata": {"name": storage.name},
                        "spec": {
                            "accessModes": ["ReadWriteOnce"],
                            "resources": {"requests": {"storage": storage.size}},
                        },
                    }),
                );
            }
            StorageKind::ConfigMap => {
                files.insert(
                    format!("{}-configmap.yaml", storage.name),
                    json!({
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": {"name": storage.name},
                        "data": storage.content,
                    }),
                );
            }
            StorageKind::Secret => {
                files.insert(
                    format!("{}-secret.yaml", storage.name),
                    json!({
                        "apiVersion": "v1",
                        "kind": "Secret",
                        "metadata": {"name": storage.name},
                        "stringData": storage.content,
                    }),
                );
            }
        }
    }
    for policy in &ir.network_policies {
        let network = json!({ format!("kubelift.io/network-{}", policy.network): "true" });
        files.insert(
            format!("{}-networkpolicy.yaml", policy.name),
            json!({
                "apiVersion": "networking.k8s.io/v1",
                "kind": "NetworkPolicy",
                "metadata": {"name": policy.name},
                "spec": {
                    "podSelector": {"matchLabels": network},
                    "ingress": [{"from": [{"podSelector": {"matchLabels": network}}]}],
                },
            }),
        );
    }
    files
}

#[async_trait]
impl Transformer for Kubernetes {
    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let mut merged = Ir::new(env.project_name());
        let mut seen_keys = std::collections::BTreeSet::new();
        for artifact in new.iter().chain(seen.iter()) {
            if artifact.artifact_type != ArtifactType::IR || !seen_keys.insert(artifact.key()) {
                continue;
            }
            match artifact.config::<Ir>() {
                Ok(ir) => merged.merge(ir),
                Err(e) => debug!(artifact = %artifact.name, error = %e, "Skipping IR artifact"),
            }
        }
        if merged.services.is_empty() {
            return Ok(TransformOutput::default());
        }

        let host = ingress_host(env.qa(), env.project_name())?;
        let files = manifests(&merged, &host);
        let dir = env.output().join(YAMLS_DIR);
        env.create_dir(&dir)?;
        for (file, object) in &files {
            env.check_cancelled()?;
            let yaml = serde_yaml::to_string(object)
                .map_err(|e| PipelineError::transformer(config.name(), file, "serialize", e))?;
            env.write_file(&dir.join(file), yaml)?;
        }
        debug!(transformer = %config.name(), files = files.len(), "Kubernetes manifests written");

        Ok(TransformOutput {
            path_mappings: vec![PathMapping::copy(&dir, Path::new(DEPLOY_DIR).join(YAMLS_DIR))],
            artifacts: vec![Artifact::new(env.project_name(), ArtifactType::KUBERNETES_YAMLS)
                .with_path(PathType::KUBERNETES_YAMLS, &dir)],
        })
    }
}
