//! Runtime configuration for kubelift
//!
//! Every process-wide knob lives in [`RuntimeConfig`], which is built once and
//! handed to the engine and plan builder. Defaults come from environment
//! variables with fallbacks.
//!
//! # Environment Variables
//!
//! - `KUBELIFT_PROJECT_NAME`: project name - default: "myproject"
//! - `KUBELIFT_OUTPUT_DIR`: output directory - default: "./<project name>"
//! - `KUBELIFT_TRANSFORMER_DIRS`: `:`-separated descriptor directories -
//!   default: the bundled `assets/transformers`
//! - `KUBELIFT_MAX_ROUNDS`: transform round limit - default: "100"
//! - `KUBELIFT_ALLOW_PARTIAL`: materialize partial output on cancel (true|false) - default: "false"
//! - `KUBELIFT_QA_RECORDING_MODE`: record store mode (record|replay|auto) - default: "auto"
//!
//! # Example
//!
//! ```no_run
//! use kubelift::RuntimeConfig;
//!
//! let mut config = RuntimeConfig::default();
//! config.source_dir = "./legacy-app".into();
//! config.validate().expect("Invalid configuration");
//! ```

use crate::environment::paths::absolute;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_PROJECT_NAME: &str = "myproject";
const DEFAULT_MAX_ROUNDS: usize = 100;
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;
pub const DEFAULT_IGNORE_FILE: &str = ".kubeliftignore";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Where question answers come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaConfig {
    /// YAML answer files, consulted in order
    pub answers_files: Vec<PathBuf>,

    /// Record/replay store path
    pub record_store: Option<PathBuf>,

    /// Prompt on the terminal for unanswered questions
    pub interactive: bool,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            answers_files: Vec::new(),
            record_store: None,
            interactive: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub project_name: String,

    /// Root of the user's source tree
    pub source_dir: PathBuf,

    /// Root of the generated output tree
    pub output_dir: PathBuf,

    /// Directories scanned for transformer descriptors
    pub transformer_dirs: Vec<PathBuf>,

    /// Transform round limit
    pub max_rounds: usize,

    /// Write accumulated mappings when the run is cancelled
    pub allow_partial: bool,

    /// Permission bits for written files (unix only)
    pub file_mode: u32,

    /// Permission bits for created directories (unix only)
    pub dir_mode: u32,

    /// Per-directory exclusion file honored by the plan walk
    pub ignore_file_name: String,

    pub qa: QaConfig,
}

/// Descriptors bundled with the crate
pub fn builtin_transformer_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("assets").join("transformers")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let project_name = env::var("KUBELIFT_PROJECT_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());

        let output_dir = env::var("KUBELIFT_OUTPUT_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".").join(&project_name));

        let transformer_dirs = env::var("KUBELIFT_TRANSFORMER_DIRS")
            .ok()
            .map(|dirs| {
                env::split_paths(&dirs)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|dirs| !dirs.is_empty())
            .unwrap_or_else(|| vec![builtin_transformer_dir()]);

        let max_rounds = env_parse("KUBELIFT_MAX_ROUNDS").unwrap_or(DEFAULT_MAX_ROUNDS);
        let allow_partial = env_parse("KUBELIFT_ALLOW_PARTIAL").unwrap_or(false);

        Self {
            project_name,
            source_dir: PathBuf::from("."),
            output_dir,
            transformer_dirs,
            max_rounds,
            allow_partial,
            file_mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
            ignore_file_name: DEFAULT_IGNORE_FILE.to_string(),
            qa: QaConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Checks that the round limit is positive, the source directory exists,
    /// and the output directory does not live inside the source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_rounds must be at least 1".to_string(),
            ));
        }

        if !self.source_dir.is_dir() {
            return Err(ConfigError::ValidationFailed(format!(
                "Source directory does not exist: {}",
                self.source_dir.display()
            )));
        }

        if self.project_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Project name must not be empty".to_string(),
            ));
        }

        let source = self
            .source_dir
            .canonicalize()
            .unwrap_or_else(|_| self.source_dir.clone());
        let output = absolute(&self.output_dir);
        if output.starts_with(&source) {
            return Err(ConfigError::ValidationFailed(format!(
                "Output directory {} must not be inside the source directory {}",
                self.output_dir.display(),
                self.source_dir.display()
            )));
        }

        Ok(())
    }

    pub fn parse_mode(field: &str, value: &str) -> Result<u32, ConfigError> {
        u32::from_str_radix(value.trim_start_matches("0o"), 8).map_err(|e| ConfigError::ParseError {
            field: field.to_string(),
            error: e.to_string(),
        })
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kubelift configuration:")?;
        writeln!(f, "  Project: {}", self.project_name)?;
        writeln!(f, "  Source: {}", self.source_dir.display())?;
        writeln!(f, "  Output: {}", self.output_dir.display())?;
        for dir in &self.transformer_dirs {
            writeln!(f, "  Transformers: {}", dir.display())?;
        }
        writeln!(f, "  Max Rounds: {}", self.max_rounds)?;
        writeln!(f, "  Allow Partial: {}", self.allow_partial)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        let _guards = vec![
            EnvGuard::set("KUBELIFT_PROJECT_NAME", "shop"),
            EnvGuard::set("KUBELIFT_MAX_ROUNDS", "7"),
            EnvGuard::set("KUBELIFT_ALLOW_PARTIAL", "true"),
        ];
        env::remove_var("KUBELIFT_OUTPUT_DIR");

        let config = RuntimeConfig::default();
        assert_eq!(config.project_name, "shop");
        assert_eq!(config.max_rounds, 7);
        assert!(config.allow_partial);
        assert_eq!(config.output_dir, PathBuf::from("./shop"));
    }

    #[test]
    #[serial]
    fn test_defaults() {
        env::remove_var("KUBELIFT_MAX_ROUNDS");
        env::remove_var("KUBELIFT_TRANSFORMER_DIRS");
        let config = RuntimeConfig::default();
        assert_eq!(config.max_rounds, 100);
        assert_eq!(config.ignore_file_name, ".kubeliftignore");
        assert_eq!(config.transformer_dirs, vec![builtin_transformer_dir()]);
        assert!(config.qa.interactive);
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let dir = TempDir::new().unwrap();
        let config = RuntimeConfig {
            source_dir: dir.path().to_path_buf(),
            output_dir: dir.path().with_extension("out"),
            max_rounds: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_output_inside_source() {
        let dir = TempDir::new().unwrap();
        let config = RuntimeConfig {
            source_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_accepts_sibling_output() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let config = RuntimeConfig {
            source_dir: dir.path().join("src"),
            output_dir: dir.path().join("out"),
            max_rounds: 10,
            ..RuntimeConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(RuntimeConfig::parse_mode("file_mode", "0o600").unwrap(), 0o600);
        assert!(RuntimeConfig::parse_mode("file_mode", "9x").is_err());
    }
}
