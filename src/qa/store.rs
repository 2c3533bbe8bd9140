//! Question/answer recording for deterministic reruns

use super::engine::{QaEngine, QaError};
use super::problem::{Answer, Problem};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Recording mode for question answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    /// Record every answer, never answer from the store
    Record,
    /// Answer from the store only, never write to it
    Replay,
    /// Answer from the store if present, otherwise record
    Auto,
}

impl RecordingMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "record" => Ok(RecordingMode::Record),
            "replay" => Ok(RecordingMode::Replay),
            "auto" => Ok(RecordingMode::Auto),
            _ => anyhow::bail!("Invalid recording mode: {}", s),
        }
    }

    pub fn from_env(default: RecordingMode) -> RecordingMode {
        std::env::var("KUBELIFT_QA_RECORDING_MODE")
            .ok()
            .and_then(|s| Self::parse(&s).ok())
            .unwrap_or(default)
    }
}

/// A recorded answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedAnswer {
    pub answer: Answer,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Timestamp when recorded (RFC 3339)
    pub recorded_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    answers: BTreeMap<String, RecordedAnswer>,
}

/// Engine that both records answers to and satisfies problems from a YAML store
pub struct RecordStore {
    path: PathBuf,
    mode: RecordingMode,
    answers: BTreeMap<String, RecordedAnswer>,
}

impl RecordStore {
    pub fn open(path: impl Into<PathBuf>, mode: RecordingMode) -> Result<Self> {
        let path = path.into();
        let answers = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read answer store: {}", path.display()))?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                let file: StoreFile = serde_yaml::from_str(&contents)
                    .with_context(|| format!("Failed to parse answer store: {}", path.display()))?;
                file.answers
            }
        } else {
            BTreeMap::new()
        };

        debug!(store = %path.display(), answers = answers.len(), ?mode, "Answer store opened");
        Ok(Self {
            path,
            mode,
            answers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&RecordedAnswer> {
        self.answers.get(key)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create answer store directory")?;
            }
        }
        let contents = serde_yaml::to_string(&StoreFile {
            answers: self.answers.clone(),
        })
        .context("Failed to serialize answer store")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write answer store: {}", self.path.display()))
    }
}

impl QaEngine for RecordStore {
    fn name(&self) -> &'static str {
        "store"
    }

    fn fetch_answer(&mut self, problem: &Problem) -> Result<Option<Answer>, QaError> {
        match self.mode {
            RecordingMode::Record => Ok(None),
            RecordingMode::Replay | RecordingMode::Auto => match self.answers.get(&problem.id) {
                Some(recorded) => Ok(Some(recorded.answer.clone())),
                None => {
                    if self.mode == RecordingMode::Replay {
                        warn!(key = %problem.id, "No recorded answer (mode: Replay)");
                    }
                    Ok(None)
                }
            },
        }
    }

    fn record(&mut self, problem: &Problem, answer: &Answer) {
        if self.mode == RecordingMode::Replay {
            return;
        }
        if self
            .answers
            .get(&problem.id)
            .is_some_and(|existing| &existing.answer == answer)
        {
            return;
        }
        self.answers.insert(
            problem.id.clone(),
            RecordedAnswer {
                answer: answer.clone(),
                description: problem.desc.clone(),
                recorded_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to persist answer store");
        }
    }
}
