//! Question engine trait and the non-interactive engines

use super::problem::{Answer, Problem};
use std::env;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum QaError {
    /// The user closed the prompt; the run should stop
    #[error("question cancelled by user")]
    Cancelled,

    #[error("I/O error while asking a question: {0}")]
    Io(#[from] std::io::Error),

    #[error("answer store error: {0}")]
    Store(String),
}

/// A backend that can answer problems
pub trait QaEngine: Send {
    fn name(&self) -> &'static str;

    /// Answers the problem, or returns `Ok(None)` to defer to the next engine
    fn fetch_answer(&mut self, problem: &Problem) -> Result<Option<Answer>, QaError>;

    /// Observes the final answer of every problem
    fn record(&mut self, problem: &Problem, answer: &Answer) {
        let _ = (problem, answer);
    }
}

/// Answers every problem with its default
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEngine;

impl QaEngine for DefaultEngine {
    fn name(&self) -> &'static str {
        "default"
    }

    fn fetch_answer(&mut self, problem: &Problem) -> Result<Option<Answer>, QaError> {
        Ok(Some(problem.default_answer()))
    }
}

/// Answers from `KUBELIFT_QA_<KEY>` environment variables
#[derive(Debug, Clone)]
pub struct EnvEngine {
    prefix: String,
}

impl Default for EnvEngine {
    fn default() -> Self {
        Self {
            prefix: "KUBELIFT_QA_".to_string(),
        }
    }
}

impl EnvEngine {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `common.services."web"."80".urlpath` -> `KUBELIFT_QA_COMMON_SERVICES_WEB_80_URLPATH`
    pub fn variable_for(&self, key: &str) -> String {
        let mut name = self.prefix.clone();
        let mut last_underscore = name.ends_with('_');
        for c in key.chars() {
            if c.is_ascii_alphanumeric() {
                name.push(c.to_ascii_uppercase());
                last_underscore = false;
            } else if !last_underscore {
                name.push('_');
                last_underscore = true;
            }
        }
        while name.ends_with('_') && name.len() > self.prefix.len() {
            name.pop();
        }
        name
    }
}

impl QaEngine for EnvEngine {
    fn name(&self) -> &'static str {
        "env"
    }

    fn fetch_answer(&mut self, problem: &Problem) -> Result<Option<Answer>, QaError> {
        let var = self.variable_for(&problem.id);
        match env::var(&var) {
            Ok(value) => {
                debug!(key = %problem.id, variable = %var, "Answer taken from environment");
                Ok(Some(Answer::Text(value)))
            }
            Err(_) => Ok(None),
        }
    }
}
