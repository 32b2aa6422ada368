//! Engine-backed "does this reply need a human?" classifier.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::context;
use tracing::{debug, warn};

use crate::core::classifier::{InputClassifier, QuestionHeuristic};
use crate::io::config::ClassifierConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptEngine, Template};

/// Only the tail of a reply is classified; questions come at the end.
const MAX_CLASSIFIED_CHARS: usize = 4000;
const OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Asks a small model for a YES/NO verdict, falling back to [`QuestionHeuristic`] on failure.
#[derive(Debug, Clone)]
pub struct EngineClassifier {
    config: ClassifierConfig,
    fallback: QuestionHeuristic,
}

impl EngineClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            fallback: QuestionHeuristic,
        }
    }

    fn ask(&self, text: &str) -> Result<bool> {
        let (program, leading) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("classifier.command is empty"))?;
        // Stays in our process group so a terminal Ctrl+C ends it too.
        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--model")
            .arg(&self.config.model);

        let prompt = render_prompt(&tail(text, MAX_CLASSIFIED_CHARS))?;
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            timeout,
            OUTPUT_LIMIT_BYTES,
        )
        .context("run classifier")?;
        if output.timed_out {
            return Err(anyhow!("classifier timed out after {timeout:?}"));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "classifier failed with status {:?}",
                output.status.code()
            ));
        }
        parse_verdict(&String::from_utf8_lossy(&output.stdout))
    }
}

impl InputClassifier for EngineClassifier {
    fn needs_input(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        match self.ask(text) {
            Ok(verdict) => {
                debug!(verdict, "classifier verdict");
                verdict
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "classifier unavailable, using question heuristic");
                self.fallback.needs_input(text)
            }
        }
    }
}

/// Pick the classifier described by `config`: empty command means heuristic only.
pub fn classifier_from_config(config: &ClassifierConfig) -> Box<dyn InputClassifier> {
    if config.command.is_empty() {
        Box::new(QuestionHeuristic)
    } else {
        Box::new(EngineClassifier::new(config.clone()))
    }
}

fn render_prompt(text: &str) -> Result<String> {
    PromptEngine::new()?.render(Template::Classifier, context! { text => text })
}

/// Last `max_chars` characters, prefixed with `...` when cut.
fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skip = count - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map_or(text.len(), |(idx, _)| idx);
    format!("...{}", &text[start..])
}

fn parse_verdict(output: &str) -> Result<bool> {
    let first = output
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_ascii_uppercase();
    match first.as_str() {
        "YES" => Ok(true),
        "NO" => Ok(false),
        _ => Err(anyhow!("unexpected classifier output {:?}", output.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_parsing() {
        assert!(parse_verdict("YES\n").expect("yes"));
        assert!(!parse_verdict("no.").expect("no"));
        assert!(parse_verdict("**Yes**").expect("yes"));
        assert!(parse_verdict("maybe").is_err());
        assert!(parse_verdict("").is_err());
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdefghij", 4), "...ghij");
    }

    #[test]
    fn prompt_embeds_text() {
        let prompt = render_prompt("Which database?").expect("render");
        assert!(prompt.contains("<text>\nWhich database?\n</text>"));
        assert!(prompt.contains("YES"));
    }

    #[test]
    fn empty_command_selects_heuristic() {
        let config = ClassifierConfig {
            command: Vec::new(),
            ..ClassifierConfig::default()
        };
        let classifier = classifier_from_config(&config);
        assert!(classifier.needs_input("Should I continue?"));
        assert!(!classifier.needs_input("Done."));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn classifier_runs_in_the_callers_process_group() {
        let script = r#"cat >/dev/null; if [ "$(cut -d' ' -f5 /proc/$$/stat)" = "$(cut -d' ' -f5 /proc/$PPID/stat)" ]; then echo YES; else echo NO; fi"#;
        let classifier = EngineClassifier::new(ClassifierConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            model: "haiku".to_string(),
            timeout_secs: 10,
        });
        assert!(classifier.needs_input("Done."));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_falls_back_to_heuristic() {
        let classifier = EngineClassifier::new(ClassifierConfig {
            command: vec!["false".to_string()],
            model: "haiku".to_string(),
            timeout_secs: 5,
        });
        assert!(classifier.needs_input("Which port should the server use?"));
        assert!(!classifier.needs_input("Server configured on port 8080."));
    }
}
