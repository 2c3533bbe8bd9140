//! Intermediate deployment representation
//!
//! An [`Ir`] is what container-producing transformers hand to manifest
//! emitters: services with their containers, port forwardings, volumes and
//! probes, plus the storages and network policies they need. It serializes to
//! YAML with camelCase keys.

pub mod preprocess;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ir {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storages: Vec<Storage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_policies: Vec<NetworkPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub service_to_pod_port_forwardings: Vec<PortForwarding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Networks this service joins; services sharing a network may talk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    /// The image is built by the generated scripts, not pulled
    #[serde(default)]
    pub new_image: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub container_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

impl ContainerPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            container_port: port,
            protocol: default_protocol(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get_path: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub initial_delay_seconds: u32,
    #[serde(default)]
    pub period_seconds: u32,
}

/// A service port and the pod port it forwards to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub number: u16,
}

impl Port {
    pub fn number(number: u16) -> Self {
        Self {
            name: String::new(),
            number,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwarding {
    pub service_port: Port,
    pub pod_port: Port,
    /// Ingress path with an optional `:N`, `:L`, `:C` or `:-` suffix
    #[serde(default)]
    pub service_rel_path: String,
}

impl PortForwarding {
    pub fn new(service_port: u16, pod_port: u16) -> Self {
        Self {
            service_port: Port::number(service_port),
            pod_port: Port::number(pod_port),
            service_rel_path: String::new(),
        }
    }

    pub fn exposure(&self) -> Exposure {
        Exposure::parse(&self.service_rel_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// How a forwarded port is exposed, decoded from its relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposure {
    /// `None` when the port gets no service at all (`:-`)
    pub service_type: Option<ServiceType>,
    /// Ingress path; only set for plain paths without a suffix
    pub ingress_path: Option<String>,
    /// A path without leading `/` names a subdomain instead
    pub subdomain: Option<String>,
}

impl Exposure {
    pub fn parse(rel_path: &str) -> Self {
        let rel_path = rel_path.trim();
        let (path, suffix) = match rel_path.rfind(':') {
            Some(i) if matches!(&rel_path[i..], ":N" | ":L" | ":C" | ":-") => {
                (&rel_path[..i], Some(&rel_path[i + 1..]))
            }
            _ => (rel_path, None),
        };

        let service_type = match suffix {
            Some("-") => None,
            Some("N") => Some(ServiceType::NodePort),
            Some("L") => Some(ServiceType::LoadBalancer),
            _ => Some(ServiceType::ClusterIP),
        };

        if suffix.is_some() || path.is_empty() {
            return Self {
                service_type,
                ingress_path: None,
                subdomain: None,
            };
        }

        if path.starts_with('/') {
            Self {
                service_type,
                ingress_path: Some(path.to_string()),
                subdomain: None,
            }
        } else {
            let (sub, rest) = match path.find('/') {
                Some(i) => (&path[..i], &path[i..]),
                None => (path, "/"),
            };
            Self {
                service_type,
                ingress_path: Some(rest.to_string()),
                subdomain: Some(sub.to_string()),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum VolumeKind {
    EmptyDir,
    #[serde(rename_all = "camelCase")]
    PersistentVolumeClaim { claim_name: String },
    ConfigMap { name: String },
    Secret { name: String },
    HostPath { path: String },
}

impl VolumeKind {
    pub fn is_persistent(&self) -> bool {
        matches!(
            self,
            VolumeKind::PersistentVolumeClaim { .. } | VolumeKind::HostPath { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    #[serde(flatten)]
    pub kind: VolumeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    PersistentVolumeClaim,
    ConfigMap,
    Secret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    pub name: String,
    pub kind: StorageKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    pub name: String,
    /// Pods on this network accept traffic from each other
    pub network: String,
}

impl Ir {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_service(&mut self, service: Service) {
        match self.services.get_mut(&service.name) {
            Some(existing) => existing.merge(service),
            None => {
                self.services.insert(service.name.clone(), service);
            }
        }
    }

    pub fn add_storage(&mut self, storage: Storage) {
        if !self.storages.iter().any(|s| s.name == storage.name) {
            self.storages.push(storage);
        }
    }

    /// Merges another IR into this one. Services with the same name are
    /// merged; storages and policies are deduplicated by name.
    pub fn merge(&mut self, other: Ir) {
        if self.name.is_empty() {
            self.name = other.name;
        }
        for (_, service) in other.services {
            self.add_service(service);
        }
        for storage in other.storages {
            self.add_storage(storage);
        }
        for policy in other.network_policies {
            if !self.network_policies.iter().any(|p| p.name == policy.name) {
                self.network_policies.push(policy);
            }
        }
    }
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn merge(&mut self, other: Service) {
        for container in other.containers {
            if !self.containers.iter().any(|c| c.name == container.name) {
                self.containers.push(container);
            }
        }
        for forwarding in other.service_to_pod_port_forwardings {
            if !self
                .service_to_pod_port_forwardings
                .iter()
                .any(|f| f.service_port.number == forwarding.service_port.number)
            {
                self.service_to_pod_port_forwardings.push(forwarding);
            }
        }
        for volume in other.volumes {
            if !self.volumes.iter().any(|v| v.name == volume.name) {
                self.volumes.push(volume);
            }
        }
        for network in other.networks {
            if !self.networks.contains(&network) {
                self.networks.push(network);
            }
        }
        if self.replicas.is_none() {
            self.replicas = other.replicas;
        }
        if self.service_account_name.is_empty() {
            self.service_account_name = other.service_account_name;
        }
        for (k, v) in other.labels {
            self.labels.entry(k).or_insert(v);
        }
        for (k, v) in other.annotations {
            self.annotations.entry(k).or_insert(v);
        }
    }

    /// Pod ports of every container, in declaration order
    pub fn container_ports(&self) -> Vec<u16> {
        let mut ports = Vec::new();
        for container in &self.containers {
            for port in &container.ports {
                if !ports.contains(&port.container_port) {
                    ports.push(port.container_port);
                }
            }
        }
        ports
    }
}
