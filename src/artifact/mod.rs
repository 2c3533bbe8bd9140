//! Typed artifact bus shared by every transformer
//!
//! An [`Artifact`] is a message flowing between transformers. It carries a
//! name, an [`ArtifactType`] tag that decides which transformers receive it,
//! named path lists keyed by [`PathType`], and a map of typed configs keyed by
//! the closed [`ConfigType`] enumeration.
//!
//! A [`PathMapping`] is a deferred filesystem side effect. Transformers return
//! them; only the engine applies them, once, after the transform loop.

pub mod configs;

pub use configs::{
    ArtifactConfig, Config, ConfigType, Configs, EarArtifactConfig, ExposedPorts, ImageName,
    NewImages, PlanConfig, S2IMetadataConfig, ServiceConfig, WarArtifactConfig,
};

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

macro_rules! string_tag {
    ($(#[$meta:meta])* $name:ident { $($(#[$cmeta:meta])* $konst:ident = $value:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            $($(#[$cmeta])* pub const $konst: &'static str = $value;)*

            pub fn new(tag: impl Into<String>) -> Self {
                Self(tag.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(tag: &str) -> Self {
                Self(tag.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_tag!(
    /// Type tag of an artifact; transformers subscribe to these
    ArtifactType {
        /// Seed artifact created from a plan service
        SERVICE = "Service",
        DOCKERFILE = "Dockerfile",
        DOCKERFILE_FOR_SERVICE = "DockerfileForService",
        WAR = "War",
        EAR = "Ear",
        S2I_METADATA = "S2IMetadata",
        NEW_IMAGES = "NewImages",
        CONTAINER_IMAGE_BUILD_SCRIPT = "ContainerImageBuildScript",
        CONTAINER_IMAGES_PUSH_SCRIPT = "ContainerImagesPushScript",
        IR = "IR",
        KUBERNETES_YAMLS = "KubernetesYamls",
    }
);

string_tag!(
    /// Tag naming one of the path lists of an artifact
    PathType {
        SERVICE_DIR = "ServiceDirectories",
        DOCKERFILE = "Dockerfile",
        DOCKERFILE_CONTEXT = "DockerfileContext",
        BUILD_CONTAINER_FILE = "BuildContainerFile",
        DEPLOYMENT_FILE = "DeploymentFile",
        BUILD_SH_SCRIPT = "ContainerImageBuildShScript",
        BUILD_SH_SCRIPT_CONTEXT = "ContainerImageBuildShScriptContext",
        BUILD_BAT_SCRIPT = "ContainerImageBuildBatScript",
        BUILD_BAT_SCRIPT_CONTEXT = "ContainerImageBuildBatScriptContext",
        PUSH_SH_SCRIPT = "ContainerImagesPushShScript",
        PUSH_BAT_SCRIPT = "ContainerImagesPushBatScript",
        KUBERNETES_YAMLS = "KubernetesYamls",
    }
);

/// A typed message on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,

    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,

    /// Restricts delivery to the transformer with this name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_with: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<PathType, Vec<PathBuf>>,

    #[serde(default, skip_serializing_if = "Configs::is_empty")]
    pub configs: Configs,
}

/// Deduplication key of an artifact: name, type and a canonical payload hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub name: String,
    pub artifact_type: ArtifactType,
    pub hash: String,
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.artifact_type, self.name, &self.hash[..12.min(self.hash.len())])
    }
}

impl Artifact {
    pub fn new(name: impl Into<String>, artifact_type: impl Into<ArtifactType>) -> Self {
        Self {
            name: name.into(),
            artifact_type: artifact_type.into(),
            process_with: None,
            paths: BTreeMap::new(),
            configs: Configs::default(),
        }
    }

    pub fn with_path(mut self, path_type: &str, path: impl Into<PathBuf>) -> Self {
        self.add_path(path_type, path);
        self
    }

    pub fn with_config<T: ArtifactConfig>(mut self, config: T) -> Self {
        self.configs.insert(config);
        self
    }

    pub fn process_with(mut self, transformer: impl Into<String>) -> Self {
        self.process_with = Some(transformer.into());
        self
    }

    pub fn add_path(&mut self, path_type: &str, path: impl Into<PathBuf>) {
        self.paths
            .entry(PathType::new(path_type))
            .or_default()
            .push(path.into());
    }

    pub fn set_paths(&mut self, path_type: &str, paths: Vec<PathBuf>) {
        self.paths.insert(PathType::new(path_type), paths);
    }

    pub fn paths_of(&self, path_type: &str) -> &[PathBuf] {
        self.paths
            .get(&PathType::new(path_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first_path(&self, path_type: &str) -> Option<&Path> {
        self.paths_of(path_type).first().map(PathBuf::as_path)
    }

    /// Decodes the config stored under `T`'s tag.
    ///
    /// Returns [`PipelineError::NoSuchConfig`] when the tag is absent and
    /// [`PipelineError::ConfigShape`] when the stored payload does not decode
    /// into `T`. Both are soft errors: the caller decides whether to continue.
    pub fn config<T: ArtifactConfig>(&self) -> Result<T, PipelineError> {
        self.configs.get::<T>()
    }

    pub fn set_config<T: ArtifactConfig>(&mut self, config: T) {
        self.configs.insert(config);
    }

    pub fn has_config(&self, config_type: ConfigType) -> bool {
        self.configs.contains(config_type)
    }

    /// Canonical JSON of everything but name and type
    pub fn canonical_payload(&self) -> String {
        #[derive(Serialize)]
        struct Payload<'a> {
            process_with: &'a Option<String>,
            paths: &'a BTreeMap<PathType, Vec<PathBuf>>,
            configs: &'a Configs,
        }

        serde_json::to_string(&Payload {
            process_with: &self.process_with,
            paths: &self.paths,
            configs: &self.configs,
        })
        .unwrap_or_default()
    }

    pub fn key(&self) -> ArtifactKey {
        let digest = Sha256::digest(self.canonical_payload().as_bytes());
        ArtifactKey {
            name: self.name.clone(),
            artifact_type: self.artifact_type.clone(),
            hash: hex::encode(digest),
        }
    }
}

/// Kind of deferred filesystem side effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathMappingType {
    /// Copy the source snapshot to `dest_path`
    Source,
    /// Render every file under `src_path` against `template_config`
    Template,
    /// Copy `src_path` to `dest_path` verbatim
    Default,
}

impl fmt::Display for PathMappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PathMappingType::Source => "Source",
            PathMappingType::Template => "Template",
            PathMappingType::Default => "Default",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMapping {
    #[serde(rename = "type")]
    pub mapping_type: PathMappingType,

    /// Absolute path inside the producing transformer's sandbox
    #[serde(default, skip_serializing_if = "is_empty_path")]
    pub src_path: PathBuf,

    /// Path relative to the global output root
    #[serde(default)]
    pub dest_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_config: Option<serde_json::Value>,
}

fn is_empty_path(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

impl PathMapping {
    pub fn source(dest_path: impl Into<PathBuf>) -> Self {
        Self {
            mapping_type: PathMappingType::Source,
            src_path: PathBuf::new(),
            dest_path: dest_path.into(),
            template_config: None,
        }
    }

    pub fn template<T: Serialize>(
        src_path: impl Into<PathBuf>,
        dest_path: impl Into<PathBuf>,
        config: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            mapping_type: PathMappingType::Template,
            src_path: src_path.into(),
            dest_path: dest_path.into(),
            template_config: Some(serde_json::to_value(config)?),
        })
    }

    pub fn copy(src_path: impl Into<PathBuf>, dest_path: impl Into<PathBuf>) -> Self {
        Self {
            mapping_type: PathMappingType::Default,
            src_path: src_path.into(),
            dest_path: dest_path.into(),
            template_config: None,
        }
    }
}
