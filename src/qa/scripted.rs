//! Answers preloaded from a YAML file keyed by question id

use super::engine::{QaEngine, QaError};
use super::problem::{Answer, Problem};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    answers: BTreeMap<String, Answer>,
}

impl ScriptedEngine {
    pub fn new(answers: BTreeMap<String, Answer>) -> Self {
        Self { answers }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read answers file: {}", path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let answers: Option<BTreeMap<String, Answer>> = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse answers file: {}", path.display()))?;
        Ok(Self::new(answers.unwrap_or_default()))
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl QaEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn fetch_answer(&mut self, problem: &Problem) -> Result<Option<Answer>, QaError> {
        match self.answers.get(&problem.id) {
            Some(answer) => Ok(Some(answer.clone())),
            None => {
                debug!(key = %problem.id, "No scripted answer, falling back");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::problem::SolutionForm;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_with_quoted_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("answers.yaml");
        fs::write(
            &path,
            "'common.services.\"web\".\"80\".urlpath': api:L\ncommon.containerruntime: podman\n",
        )
        .unwrap();

        let mut engine = ScriptedEngine::from_file(&path).unwrap();
        assert_eq!(engine.len(), 2);

        let problem = Problem::new(
            "common.services.\"web\".\"80\".urlpath",
            "path?",
            SolutionForm::Input {
                default: "/web".into(),
            },
        );
        assert_eq!(
            engine.fetch_answer(&problem).unwrap(),
            Some(Answer::Text("api:L".into()))
        );
    }

    #[test]
    fn test_unknown_key_defers() {
        let mut engine = ScriptedEngine::default();
        let problem = Problem::new("missing", "?", SolutionForm::Password);
        assert_eq!(engine.fetch_answer(&problem).unwrap(), None);
    }

    #[test]
    fn test_empty_file_is_empty_engine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("answers.yaml");
        fs::write(&path, "").unwrap();
        assert!(ScriptedEngine::from_file(&path).unwrap().is_empty());
    }
}
