//! Closed set of artifact config schemas
//!
//! Every config tag maps to exactly one schema. The on-disk form of
//! [`Configs`] is a map from tag to payload; decoding is driven by the tag, so
//! there is no reflection involved. A payload that does not fit its tag's
//! schema is kept as [`Config::Undecodable`] and surfaces as
//! [`PipelineError::ConfigShape`] when somebody asks for it.

use crate::error::PipelineError;
use crate::ir::Ir;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfigType {
    Service,
    Plan,
    ImageName,
    NewImages,
    War,
    Ear,
    #[serde(rename = "IR")]
    Ir,
    ExposedPorts,
    S2IMetadata,
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigType::Service => "Service",
            ConfigType::Plan => "Plan",
            ConfigType::ImageName => "ImageName",
            ConfigType::NewImages => "NewImages",
            ConfigType::War => "War",
            ConfigType::Ear => "Ear",
            ConfigType::Ir => "IR",
            ConfigType::ExposedPorts => "ExposedPorts",
            ConfigType::S2IMetadata => "S2IMetadata",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    pub plan_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageName {
    #[serde(default)]
    pub image_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImages {
    #[serde(default)]
    pub image_names: Vec<String>,
}

/// Ports a generated container listens on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedPorts {
    #[serde(default)]
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarArtifactConfig {
    pub deployment_file: String,
    #[serde(default)]
    pub java_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_container_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deployment_file_dir_in_build_container: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_variables: BTreeMap<String, String>,
}

/// EAR archives carry the same deployment fields as WAR archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarArtifactConfig {
    pub deployment_file: String,
    #[serde(default)]
    pub java_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_container_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deployment_file_dir_in_build_container: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_variables: BTreeMap<String, String>,
}

/// Source-to-image build settings of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S2IMetadataConfig {
    #[serde(default)]
    pub image_name: String,
    /// Builder image the sources are assembled with
    #[serde(default)]
    pub builder: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Config {
    Service(ServiceConfig),
    Plan(PlanConfig),
    ImageName(ImageName),
    NewImages(NewImages),
    War(WarArtifactConfig),
    Ear(EarArtifactConfig),
    Ir(Box<Ir>),
    ExposedPorts(ExposedPorts),
    S2IMetadata(S2IMetadataConfig),
    /// Payload whose shape did not match its tag when loaded
    Undecodable {
        config_type: ConfigType,
        value: serde_json::Value,
        reason: String,
    },
}

impl Config {
    pub fn config_type(&self) -> ConfigType {
        match self {
            Config::Service(_) => ConfigType::Service,
            Config::Plan(_) => ConfigType::Plan,
            Config::ImageName(_) => ConfigType::ImageName,
            Config::NewImages(_) => ConfigType::NewImages,
            Config::War(_) => ConfigType::War,
            Config::Ear(_) => ConfigType::Ear,
            Config::Ir(_) => ConfigType::Ir,
            Config::ExposedPorts(_) => ConfigType::ExposedPorts,
            Config::S2IMetadata(_) => ConfigType::S2IMetadata,
            Config::Undecodable { config_type, .. } => *config_type,
        }
    }

    /// Decodes a payload according to its tag; never fails
    pub fn decode(config_type: ConfigType, value: serde_json::Value) -> Self {
        fn typed<T: serde::de::DeserializeOwned>(
            config_type: ConfigType,
            value: serde_json::Value,
            wrap: impl FnOnce(T) -> Config,
        ) -> Config {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(v) => wrap(v),
                Err(e) => Config::Undecodable {
                    config_type,
                    value,
                    reason: e.to_string(),
                },
            }
        }

        match config_type {
            ConfigType::Service => typed(config_type, value, Config::Service),
            ConfigType::Plan => typed(config_type, value, Config::Plan),
            ConfigType::ImageName => typed(config_type, value, Config::ImageName),
            ConfigType::NewImages => typed(config_type, value, Config::NewImages),
            ConfigType::War => typed(config_type, value, Config::War),
            ConfigType::Ear => typed(config_type, value, Config::Ear),
            ConfigType::Ir => typed(config_type, value, |ir: Ir| Config::Ir(Box::new(ir))),
            ConfigType::ExposedPorts => typed(config_type, value, Config::ExposedPorts),
            ConfigType::S2IMetadata => typed(config_type, value, Config::S2IMetadata),
        }
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Config::Service(c) => serde_json::to_value(c),
            Config::Plan(c) => serde_json::to_value(c),
            Config::ImageName(c) => serde_json::to_value(c),
            Config::NewImages(c) => serde_json::to_value(c),
            Config::War(c) => serde_json::to_value(c),
            Config::Ear(c) => serde_json::to_value(c),
            Config::Ir(c) => serde_json::to_value(c.as_ref()),
            Config::ExposedPorts(c) => serde_json::to_value(c),
            Config::S2IMetadata(c) => serde_json::to_value(c),
            Config::Undecodable { value, .. } => Ok(value.clone()),
        }
    }
}

/// A schema that can live in an artifact's config map
pub trait ArtifactConfig: Clone + Sized {
    const CONFIG_TYPE: ConfigType;

    fn into_config(self) -> Config;

    fn from_config(config: &Config) -> Option<&Self>;
}

macro_rules! artifact_config {
    ($ty:ty => $variant:ident) => {
        impl ArtifactConfig for $ty {
            const CONFIG_TYPE: ConfigType = ConfigType::$variant;

            fn into_config(self) -> Config {
                Config::$variant(self)
            }

            fn from_config(config: &Config) -> Option<&Self> {
                match config {
                    Config::$variant(c) => Some(c),
                    _ => None,
                }
            }
        }
    };
}

artifact_config!(ServiceConfig => Service);
artifact_config!(PlanConfig => Plan);
artifact_config!(ImageName => ImageName);
artifact_config!(NewImages => NewImages);
artifact_config!(WarArtifactConfig => War);
artifact_config!(EarArtifactConfig => Ear);
artifact_config!(ExposedPorts => ExposedPorts);
artifact_config!(S2IMetadataConfig => S2IMetadata);

impl ArtifactConfig for Ir {
    const CONFIG_TYPE: ConfigType = ConfigType::Ir;

    fn into_config(self) -> Config {
        Config::Ir(Box::new(self))
    }

    fn from_config(config: &Config) -> Option<&Self> {
        match config {
            Config::Ir(ir) => Some(ir.as_ref()),
            _ => None,
        }
    }
}

/// Config map of an artifact, keyed by tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configs(BTreeMap<ConfigType, Config>);

impl Configs {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, config_type: ConfigType) -> bool {
        self.0.contains_key(&config_type)
    }

    pub fn insert<T: ArtifactConfig>(&mut self, config: T) {
        self.0.insert(T::CONFIG_TYPE, config.into_config());
    }

    pub fn insert_config(&mut self, config: Config) {
        self.0.insert(config.config_type(), config);
    }

    pub fn remove(&mut self, config_type: ConfigType) -> Option<Config> {
        self.0.remove(&config_type)
    }

    pub fn get<T: ArtifactConfig>(&self) -> Result<T, PipelineError> {
        let config = self
            .0
            .get(&T::CONFIG_TYPE)
            .ok_or(PipelineError::NoSuchConfig(T::CONFIG_TYPE))?;
        match T::from_config(config) {
            Some(c) => Ok(c.clone()),
            None => Err(PipelineError::ConfigShape {
                config_type: T::CONFIG_TYPE,
                reason: match config {
                    Config::Undecodable { reason, .. } => reason.clone(),
                    other => format!("stored as {}", other.config_type()),
                },
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Config> {
        self.0.values()
    }

    /// Copies every config of `other` not already present here
    pub fn merge_missing(&mut self, other: &Configs) {
        for (tag, config) in &other.0 {
            self.0.entry(*tag).or_insert_with(|| config.clone());
        }
    }
}

impl Serialize for Configs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut payloads = BTreeMap::new();
        for (tag, config) in &self.0 {
            payloads.insert(*tag, config.payload().map_err(S::Error::custom)?);
        }
        payloads.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Configs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?
            .unwrap_or_default();
        let mut configs = BTreeMap::new();
        for (tag, value) in raw {
            let config_type: ConfigType =
                serde_json::from_value(serde_json::Value::String(tag.clone()))
                    .map_err(|_| D::Error::custom(format!("unknown config type '{}'", tag)))?;
            configs.insert(config_type, Config::decode(config_type, value));
        }
        Ok(Configs(configs))
    }
}
