//! Question bridge
//!
//! Every question the pipeline asks goes through one [`QuestionBridge`]. A
//! question is a [`Problem`] keyed by a dotted id such as
//! `common.services."web"."80".urlpath`. The bridge walks its engine chain
//! until one engine answers, coerces that answer to the problem's form and
//! lets every engine observe the final answer (which is how the record store
//! learns). Answers are cached for the lifetime of the bridge, so asking the
//! same key twice yields the same answer.
//!
//! Prompts are serialized through a mutex; callers see a synchronous API.

pub mod common;
mod engine;
mod interactive;
mod problem;
mod scripted;
mod store;

pub use engine::{DefaultEngine, EnvEngine, QaEngine, QaError};
pub use interactive::InteractiveEngine;
pub use problem::{parse_bool, Answer, Problem, SolutionForm};
pub use scripted::ScriptedEngine;
pub use store::{RecordStore, RecordedAnswer, RecordingMode};

use crate::cancel::CancelToken;
use crate::config::QaConfig;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

struct BridgeState {
    engines: Vec<Box<dyn QaEngine>>,
    session: BTreeMap<String, Answer>,
}

pub struct QuestionBridge {
    state: Mutex<BridgeState>,
    cancel: CancelToken,
}

impl QuestionBridge {
    pub fn new(engines: Vec<Box<dyn QaEngine>>, cancel: CancelToken) -> Self {
        Self {
            state: Mutex::new(BridgeState {
                engines,
                session: BTreeMap::new(),
            }),
            cancel,
        }
    }

    /// A bridge that answers everything with defaults
    pub fn with_defaults() -> Self {
        Self::new(vec![Box::new(DefaultEngine)], CancelToken::new())
    }

    /// A bridge that answers from a fixed map, then defaults
    pub fn scripted(answers: BTreeMap<String, Answer>) -> Self {
        Self::new(
            vec![Box::new(ScriptedEngine::new(answers)), Box::new(DefaultEngine)],
            CancelToken::new(),
        )
    }

    /// Builds the engine chain: environment, answer files, record store,
    /// then the terminal or defaults.
    pub fn from_config(config: &QaConfig, cancel: CancelToken) -> Result<Self> {
        let mut engines: Vec<Box<dyn QaEngine>> = vec![Box::new(EnvEngine::default())];

        for file in &config.answers_files {
            let engine = ScriptedEngine::from_file(file)?;
            debug!(file = %file.display(), answers = engine.len(), "Loaded answers file");
            engines.push(Box::new(engine));
        }

        if let Some(path) = &config.record_store {
            let mode = RecordingMode::from_env(RecordingMode::Auto);
            engines.push(Box::new(RecordStore::open(path, mode)?));
        }

        if config.interactive && InteractiveEngine::is_terminal() {
            engines.push(Box::new(InteractiveEngine::stdio()));
        } else {
            engines.push(Box::new(DefaultEngine));
        }

        Ok(Self::new(engines, cancel))
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Asks a problem and returns the coerced answer
    pub fn ask(&self, problem: &Problem) -> Result<Answer, QaError> {
        if self.cancel.is_cancelled() {
            return Err(QaError::Cancelled);
        }

        let mut state = self.lock();
        if let Some(answer) = state.session.get(&problem.id) {
            if let Some(answer) = problem.coerce(answer.clone()) {
                return Ok(answer);
            }
        }

        let mut resolved = None;
        for engine in state.engines.iter_mut() {
            match engine.fetch_answer(problem) {
                Ok(Some(raw)) => {
                    match problem.coerce(raw.clone()) {
                        Some(answer) => resolved = Some(answer),
                        None => {
                            warn!(
                                key = %problem.id,
                                engine = engine.name(),
                                answer = %raw,
                                "Answer does not fit the question, using default"
                            );
                            resolved = Some(problem.default_answer());
                        }
                    }
                    debug!(key = %problem.id, engine = engine.name(), "Question answered");
                    break;
                }
                Ok(None) => continue,
                Err(QaError::Cancelled) => {
                    self.cancel.cancel();
                    return Err(QaError::Cancelled);
                }
                Err(e) => {
                    warn!(key = %problem.id, engine = engine.name(), error = %e, "Question engine failed");
                }
            }
        }

        let answer = resolved.unwrap_or_else(|| problem.default_answer());
        for engine in state.engines.iter_mut() {
            engine.record(problem, &answer);
        }
        state.session.insert(problem.id.clone(), answer.clone());
        Ok(answer)
    }

    pub fn fetch_string(
        &self,
        key: &str,
        desc: &str,
        hints: &[&str],
        default: &str,
    ) -> Result<String, QaError> {
        let problem = Problem::new(
            key,
            desc,
            SolutionForm::Input {
                default: default.to_string(),
            },
        )
        .with_hints(hints);
        Ok(self.ask(&problem)?.to_string())
    }

    pub fn fetch_password(&self, key: &str, desc: &str, hints: &[&str]) -> Result<String, QaError> {
        let problem = Problem::new(key, desc, SolutionForm::Password).with_hints(hints);
        Ok(self.ask(&problem)?.to_string())
    }

    pub fn fetch_bool(
        &self,
        key: &str,
        desc: &str,
        hints: &[&str],
        default: bool,
    ) -> Result<bool, QaError> {
        let problem =
            Problem::new(key, desc, SolutionForm::Confirm { default }).with_hints(hints);
        match self.ask(&problem)? {
            Answer::Bool(b) => Ok(b),
            _ => Ok(default),
        }
    }

    pub fn fetch_select(
        &self,
        key: &str,
        desc: &str,
        hints: &[&str],
        options: &[&str],
        default: &str,
    ) -> Result<String, QaError> {
        let problem = Problem::new(
            key,
            desc,
            SolutionForm::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
                default: default.to_string(),
            },
        )
        .with_hints(hints);
        Ok(self.ask(&problem)?.to_string())
    }

    pub fn fetch_multi_select(
        &self,
        key: &str,
        desc: &str,
        hints: &[&str],
        options: &[&str],
        default: &[&str],
    ) -> Result<Vec<String>, QaError> {
        let problem = Problem::new(
            key,
            desc,
            SolutionForm::MultiSelect {
                options: options.iter().map(|o| o.to_string()).collect(),
                default: default.iter().map(|o| o.to_string()).collect(),
            },
        )
        .with_hints(hints);
        match self.ask(&problem)? {
            Answer::List(items) => Ok(items),
            other => Ok(vec![other.to_string()]),
        }
    }
}

impl Default for QuestionBridge {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEngine {
        asked: Arc<AtomicUsize>,
        answer: Answer,
    }

    impl QaEngine for CountingEngine {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn fetch_answer(&mut self, _problem: &Problem) -> Result<Option<Answer>, QaError> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.answer.clone()))
        }
    }

    #[test]
    fn test_scripted_answer_wins_over_default() {
        let mut answers = BTreeMap::new();
        answers.insert("k".to_string(), Answer::Text("api:L".into()));
        let qa = QuestionBridge::scripted(answers);
        assert_eq!(qa.fetch_string("k", "?", &[], "/web").unwrap(), "api:L");
        assert_eq!(qa.fetch_string("other", "?", &[], "/web").unwrap(), "/web");
    }

    #[test]
    fn test_invalid_answer_falls_back_to_default() {
        let mut answers = BTreeMap::new();
        answers.insert("rt".to_string(), Answer::Text("rkt".into()));
        let qa = QuestionBridge::scripted(answers);
        assert_eq!(
            qa.fetch_select("rt", "?", &[], &["docker", "podman"], "docker")
                .unwrap(),
            "docker"
        );
    }

    #[test]
    fn test_answers_are_cached_per_session() {
        let asked = Arc::new(AtomicUsize::new(0));
        let qa = QuestionBridge::new(
            vec![Box::new(CountingEngine {
                asked: asked.clone(),
                answer: Answer::Text("x".into()),
            })],
            CancelToken::new(),
        );
        qa.fetch_string("k", "?", &[], "d").unwrap();
        qa.fetch_string("k", "?", &[], "d").unwrap();
        assert_eq!(asked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eof_cancels_bridge() {
        let cancel = CancelToken::new();
        let qa = QuestionBridge::new(
            vec![Box::new(InteractiveEngine::new(Cursor::new(""), Vec::new()))],
            cancel.clone(),
        );
        assert!(matches!(
            qa.fetch_bool("k", "?", &[], true),
            Err(QaError::Cancelled)
        ));
        assert!(cancel.is_cancelled());
        assert!(matches!(
            qa.fetch_string("other", "?", &[], ""),
            Err(QaError::Cancelled)
        ));
    }

    #[test]
    fn test_multi_select_default() {
        let qa = QuestionBridge::with_defaults();
        assert_eq!(
            qa.fetch_multi_select("envs", "?", &[], &["dev", "prod"], &["dev", "prod"])
                .unwrap(),
            vec!["dev".to_string(), "prod".to_string()]
        );
    }
}
