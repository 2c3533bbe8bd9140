//! Question and answer types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Shape of the answer a problem expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolutionForm {
    Input { default: String },
    Password,
    Confirm { default: bool },
    Select { options: Vec<String>, default: String },
    MultiSelect { options: Vec<String>, default: Vec<String> },
}

/// An answer as stored in answer files and record stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    Bool(bool),
    List(Vec<String>),
    Text(String),
}

impl<'de> Deserialize<'de> for Answer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        fn scalar(value: serde_json::Value) -> String {
            match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            }
        }

        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Bool(b) => Answer::Bool(b),
            serde_json::Value::Array(items) => Answer::List(items.into_iter().map(scalar).collect()),
            other => Answer::Text(scalar(other)),
        })
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Bool(b) => write!(f, "{}", b),
            Answer::List(items) => write!(f, "{}", items.join(",")),
            Answer::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub id: String,
    pub desc: String,
    pub hints: Vec<String>,
    pub form: SolutionForm,
}

impl Problem {
    pub fn new(id: impl Into<String>, desc: impl Into<String>, form: SolutionForm) -> Self {
        Self {
            id: id.into(),
            desc: desc.into(),
            hints: Vec::new(),
            form,
        }
    }

    pub fn with_hints(mut self, hints: &[&str]) -> Self {
        self.hints = hints.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn default_answer(&self) -> Answer {
        match &self.form {
            SolutionForm::Input { default } => Answer::Text(default.clone()),
            SolutionForm::Password => Answer::Text(String::new()),
            SolutionForm::Confirm { default } => Answer::Bool(*default),
            SolutionForm::Select { default, .. } => Answer::Text(default.clone()),
            SolutionForm::MultiSelect { default, .. } => Answer::List(default.clone()),
        }
    }

    /// Coerces a raw answer into the shape this problem expects.
    ///
    /// Returns `None` when the answer cannot be made to fit, e.g. a select
    /// answer that is not one of the options.
    pub fn coerce(&self, answer: Answer) -> Option<Answer> {
        match (&self.form, answer) {
            (SolutionForm::Input { .. } | SolutionForm::Password, Answer::Text(s)) => {
                Some(Answer::Text(s))
            }
            (SolutionForm::Input { .. } | SolutionForm::Password, Answer::Bool(b)) => {
                Some(Answer::Text(b.to_string()))
            }
            (SolutionForm::Confirm { .. }, Answer::Bool(b)) => Some(Answer::Bool(b)),
            (SolutionForm::Confirm { .. }, Answer::Text(s)) => parse_bool(&s).map(Answer::Bool),
            (SolutionForm::Select { options, .. }, Answer::Text(s)) => options
                .iter()
                .find(|o| o.as_str() == s.trim())
                .map(|o| Answer::Text(o.clone())),
            (SolutionForm::MultiSelect { options, .. }, Answer::List(items)) => {
                if items.iter().all(|i| options.contains(i)) {
                    Some(Answer::List(items))
                } else {
                    None
                }
            }
            (SolutionForm::MultiSelect { options, .. }, Answer::Text(s)) => {
                let items: Vec<String> = s
                    .split(',')
                    .map(|i| i.trim().to_string())
                    .filter(|i| !i.is_empty())
                    .collect();
                if items.iter().all(|i| options.contains(i)) {
                    Some(Answer::List(items))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select() -> Problem {
        Problem::new(
            "k",
            "pick",
            SolutionForm::Select {
                options: vec!["docker".into(), "podman".into()],
                default: "docker".into(),
            },
        )
    }

    #[test]
    fn test_select_rejects_unknown_option() {
        assert_eq!(select().coerce(Answer::Text("rkt".into())), None);
        assert_eq!(
            select().coerce(Answer::Text(" podman ".into())),
            Some(Answer::Text("podman".into()))
        );
    }

    #[test]
    fn test_confirm_accepts_text() {
        let p = Problem::new("k", "ok?", SolutionForm::Confirm { default: false });
        assert_eq!(p.coerce(Answer::Text("yes".into())), Some(Answer::Bool(true)));
        assert_eq!(p.coerce(Answer::Text("maybe".into())), None);
    }

    #[test]
    fn test_multiselect_from_comma_list() {
        let p = Problem::new(
            "k",
            "envs",
            SolutionForm::MultiSelect {
                options: vec!["dev".into(), "prod".into()],
                default: vec![],
            },
        );
        assert_eq!(
            p.coerce(Answer::Text("dev, prod".into())),
            Some(Answer::List(vec!["dev".into(), "prod".into()]))
        );
    }

    #[test]
    fn test_answer_yaml_untagged() {
        let a: Answer = serde_yaml::from_str("api:L").unwrap();
        assert_eq!(a, Answer::Text("api:L".into()));
        let b: Answer = serde_yaml::from_str("true").unwrap();
        assert_eq!(b, Answer::Bool(true));
        let l: Answer = serde_yaml::from_str("[a, b]").unwrap();
        assert_eq!(l, Answer::List(vec!["a".into(), "b".into()]));
        let n: Answer = serde_yaml::from_str("3000").unwrap();
        assert_eq!(n, Answer::Text("3000".into()));
    }
}
