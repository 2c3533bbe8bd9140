//! Terminal prompts

use super::engine::{QaEngine, QaError};
use super::problem::{Answer, Problem, SolutionForm};
use std::io::{self, BufRead, Write};

/// Prompts on a terminal (or any line-oriented reader/writer pair).
///
/// End of input cancels the run.
pub struct InteractiveEngine<R, W> {
    input: R,
    output: W,
}

impl InteractiveEngine<io::BufReader<io::Stdin>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stderr())
    }

    pub fn is_terminal() -> bool {
        atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stderr)
    }
}

impl<R: BufRead, W: Write> InteractiveEngine<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, problem: &Problem) -> io::Result<()> {
        writeln!(self.output, "? {}", problem.desc)?;
        for hint in &problem.hints {
            writeln!(self.output, "  hint: {}", hint)?;
        }
        match &problem.form {
            SolutionForm::Input { default } => write!(self.output, "  [{}]: ", default)?,
            SolutionForm::Password => write!(self.output, "  (password): ")?,
            SolutionForm::Confirm { default } => {
                write!(self.output, "  [{}]: ", if *default { "Y/n" } else { "y/N" })?
            }
            SolutionForm::Select { options, default } => {
                for (i, option) in options.iter().enumerate() {
                    let marker = if option == default { "*" } else { " " };
                    writeln!(self.output, "  {} {}) {}", marker, i + 1, option)?;
                }
                write!(self.output, "  choice [{}]: ", default)?
            }
            SolutionForm::MultiSelect { options, default } => {
                for (i, option) in options.iter().enumerate() {
                    let marker = if default.contains(option) { "*" } else { " " };
                    writeln!(self.output, "  {} {}) {}", marker, i + 1, option)?;
                }
                write!(self.output, "  choices, comma separated [{}]: ", default.join(","))?
            }
        }
        self.output.flush()
    }

    fn read_line(&mut self) -> Result<String, QaError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(QaError::Cancelled);
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// Maps `2` to the second option; anything else is returned unchanged
fn resolve_index(options: &[String], raw: &str) -> String {
    raw.trim()
        .parse::<usize>()
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
        .unwrap_or_else(|| raw.trim().to_string())
}

impl<R: BufRead + Send, W: Write + Send> QaEngine for InteractiveEngine<R, W> {
    fn name(&self) -> &'static str {
        "interactive"
    }

    fn fetch_answer(&mut self, problem: &Problem) -> Result<Option<Answer>, QaError> {
        loop {
            self.prompt(problem)?;
            let line = self.read_line()?;
            if line.trim().is_empty() {
                return Ok(Some(problem.default_answer()));
            }

            let raw = match &problem.form {
                SolutionForm::Select { options, .. } => Answer::Text(resolve_index(options, &line)),
                SolutionForm::MultiSelect { options, .. } => Answer::List(
                    line.split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| resolve_index(options, s))
                        .collect(),
                ),
                _ => Answer::Text(line.trim().to_string()),
            };

            match problem.coerce(raw) {
                Some(answer) => return Ok(Some(answer)),
                None => writeln!(self.output, "  invalid answer, try again")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn select() -> Problem {
        Problem::new(
            "common.containerruntime",
            "Which container runtime?",
            SolutionForm::Select {
                options: vec!["docker".into(), "podman".into()],
                default: "docker".into(),
            },
        )
    }

    #[test]
    fn test_select_by_index() {
        let mut engine = InteractiveEngine::new(Cursor::new("2\n"), Vec::new());
        assert_eq!(
            engine.fetch_answer(&select()).unwrap(),
            Some(Answer::Text("podman".into()))
        );
    }

    #[test]
    fn test_empty_line_takes_default() {
        let mut engine = InteractiveEngine::new(Cursor::new("\n"), Vec::new());
        assert_eq!(
            engine.fetch_answer(&select()).unwrap(),
            Some(Answer::Text("docker".into()))
        );
    }

    #[test]
    fn test_invalid_then_valid() {
        let mut out = Vec::new();
        {
            let mut engine = InteractiveEngine::new(Cursor::new("rkt\npodman\n"), &mut out);
            assert_eq!(
                engine.fetch_answer(&select()).unwrap(),
                Some(Answer::Text("podman".into()))
            );
        }
        assert!(String::from_utf8(out).unwrap().contains("invalid answer"));
    }

    #[test]
    fn test_eof_cancels() {
        let mut engine = InteractiveEngine::new(Cursor::new(""), Vec::new());
        assert!(matches!(
            engine.fetch_answer(&select()),
            Err(QaError::Cancelled)
        ));
    }

    #[test]
    fn test_prompt_shows_hints() {
        let mut out = Vec::new();
        {
            let problem = Problem::new(
                "k",
                "Path?",
                SolutionForm::Input {
                    default: "/web".into(),
                },
            )
            .with_hints(&["Add :N as suffix for NodePort service type"]);
            let mut engine = InteractiveEngine::new(Cursor::new("/api\n"), &mut out);
            assert_eq!(
                engine.fetch_answer(&problem).unwrap(),
                Some(Answer::Text("/api".into()))
            );
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("hint: Add :N"));
        assert!(text.contains("[/web]"));
    }
}
