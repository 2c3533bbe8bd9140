use super::IrPreprocessor;
use crate::error::PipelineError;
use crate::ir::{Ir, Storage, StorageKind, VolumeKind};
use crate::qa::QuestionBridge;
use std::collections::BTreeMap;

pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

/// Splits volumes into ephemeral and persistent ones. Host paths are not
/// portable across nodes, so they become claims; every claim gets a PVC
/// storage entry. Storages end up sorted by name.
pub struct StoragePreprocessor {
    pub default_size: String,
}

impl Default for StoragePreprocessor {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_STORAGE_SIZE.to_string(),
        }
    }
}

impl IrPreprocessor for StoragePreprocessor {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn preprocess(&self, mut ir: Ir, _qa: &QuestionBridge) -> Result<Ir, PipelineError> {
        let mut claims = Vec::new();
        for (name, service) in ir.services.iter_mut() {
            for volume in service.volumes.iter_mut() {
                if let VolumeKind::HostPath { .. } = volume.kind {
                    volume.kind = VolumeKind::PersistentVolumeClaim {
                        claim_name: format!("{}-{}", name, volume.name),
                    };
                }
                if let VolumeKind::PersistentVolumeClaim { claim_name } = &volume.kind {
                    claims.push(claim_name.clone());
                }
            }
        }

        for claim in claims {
            ir.add_storage(Storage {
                name: claim,
                kind: StorageKind::PersistentVolumeClaim,
                size: self.default_size.clone(),
                content: BTreeMap::new(),
            });
        }
        ir.storages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::preprocess::fixtures::web_ir;
    use crate::ir::Volume;

    #[test]
    fn test_claims_become_storages() {
        let qa = QuestionBridge::with_defaults();
        let mut ir = web_ir();
        ir.services.get_mut("web").unwrap().volumes.push(Volume {
            name: "logs".into(),
            kind: VolumeKind::HostPath {
                path: "/var/log/web".into(),
            },
        });
        let once = StoragePreprocessor::default().preprocess(ir, &qa).unwrap();
        let names: Vec<_> = once.storages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["web-data", "web-logs"]);
        assert!(once.storages.iter().all(|s| s.size == "1Gi"));

        let twice = StoragePreprocessor::default()
            .preprocess(once.clone(), &qa)
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_ephemeral_volumes_get_no_storage() {
        let qa = QuestionBridge::with_defaults();
        let mut ir = web_ir();
        ir.services.get_mut("web").unwrap().volumes.retain(|v| v.name == "tmp");
        let ir = StoragePreprocessor::default().preprocess(ir, &qa).unwrap();
        assert!(ir.storages.is_empty());
    }
}
