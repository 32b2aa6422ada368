//! Operator-facing rendering of engine events.
//!
//! Separate from tracing: this is product output on stdout, shaped by the
//! `--verbosity` flag.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::io::engine::{ContentBlock, EngineEvent, Message, MessageContent, TurnResult};

const THINKING_PREVIEW_CHARS: usize = 200;
const COMMAND_PREVIEW_CHARS: usize = 60;
const VALUE_PREVIEW_CHARS: usize = 40;
const TOOL_RESULT_CHARS: usize = 1000;

/// Receives every engine event of a turn plus loop notices.
pub trait Renderer {
    fn render(&mut self, event: &EngineEvent);

    /// Loop progress line such as "Waiting for your input...".
    fn notice(&mut self, text: &str);
}

/// How much of each turn to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Assistant text, tool names and a one-line result.
    Minimal,
    /// Adds tool arguments, tool outcomes and truncated thinking.
    #[default]
    Medium,
    /// Everything in full.
    Verbose,
}

impl Verbosity {
    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Minimal => "minimal",
            Verbosity::Medium => "medium",
            Verbosity::Verbose => "verbose",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Verbosity::Minimal),
            "medium" => Ok(Verbosity::Medium),
            "verbose" => Ok(Verbosity::Verbose),
            other => Err(anyhow!(
                "unknown verbosity {other:?} (expected minimal, medium or verbose)"
            )),
        }
    }
}

/// Plain-text renderer writing to stdout (or any writer in tests).
pub struct ConsoleRenderer<W: Write = io::Stdout> {
    verbosity: Verbosity,
    out: W,
}

impl ConsoleRenderer<io::Stdout> {
    pub fn stdout(verbosity: Verbosity) -> Self {
        Self::new(verbosity, io::stdout())
    }
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(verbosity: Verbosity, out: W) -> Self {
        Self { verbosity, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if let Err(err) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            warn!(err = %err, "failed to write console output");
        }
    }

    fn message(&mut self, message: &Message, label: Option<&str>) {
        match &message.content {
            MessageContent::Text(text) => {
                if let Some(label) = label {
                    self.line(&format!("{label}: {text}"));
                } else if !text.trim().is_empty() {
                    self.line(text);
                }
            }
            MessageContent::Blocks(blocks) => {
                if let Some(label) = label {
                    self.line(&format!("{label}:"));
                }
                for block in blocks {
                    self.block(block);
                }
            }
        }
    }

    fn block(&mut self, block: &ContentBlock) {
        match block {
            ContentBlock::Text { text } => {
                if !text.trim().is_empty() {
                    self.line(text);
                }
            }
            ContentBlock::Thinking { thinking } => match self.verbosity {
                Verbosity::Minimal => {}
                Verbosity::Medium => {
                    self.line(&format!(
                        "[thinking] {}",
                        preview(thinking, THINKING_PREVIEW_CHARS)
                    ));
                }
                Verbosity::Verbose => self.line(&format!("[thinking]\n{thinking}")),
            },
            ContentBlock::ToolUse { name, input } => match self.verbosity {
                Verbosity::Minimal => self.line(&format!("Tool: {name}")),
                Verbosity::Medium => {
                    let summary = tool_summary(name, input);
                    if summary.is_empty() {
                        self.line(&format!("Tool: {name}"));
                    } else {
                        self.line(&format!("Tool: {name} ({summary})"));
                    }
                }
                Verbosity::Verbose => {
                    self.line(&format!("Tool: {name}"));
                    let pretty = serde_json::to_string_pretty(input)
                        .unwrap_or_else(|_| input.to_string());
                    self.line(&indent(&pretty));
                }
            },
            ContentBlock::ToolResult { content, is_error } => {
                let outcome = if is_error.unwrap_or(false) {
                    "Error"
                } else {
                    "Success"
                };
                match self.verbosity {
                    Verbosity::Minimal => {}
                    Verbosity::Medium => self.line(&format!("  -> {outcome}")),
                    Verbosity::Verbose => {
                        self.line(&format!("  -> {outcome}"));
                        let text = tool_result_text(content);
                        if !text.trim().is_empty() {
                            let shown = match text.char_indices().nth(TOOL_RESULT_CHARS) {
                                Some((idx, _)) => format!("{}\n... (truncated)", &text[..idx]),
                                None => text,
                            };
                            self.line(&indent(&shown));
                        }
                    }
                }
            }
            ContentBlock::Unknown => {
                if self.verbosity == Verbosity::Verbose {
                    self.line("[unknown content block]");
                }
            }
        }
    }

    fn result(&mut self, result: &TurnResult) {
        let outcome = if result.is_error { "Error" } else { "Complete" };
        let mut parts = vec![format!("turns: {}", result.num_turns)];
        if let Some(cost) = result.total_cost_usd {
            parts.push(format!("cost: ${cost:.4}"));
        }
        if self.verbosity != Verbosity::Minimal
            && let Some(ms) = result.duration_ms
        {
            parts.push(format!("duration: {:.1}s", ms as f64 / 1000.0));
        }
        self.line(&format!("--- {outcome} ({}) ---", parts.join(", ")));
        if self.verbosity == Verbosity::Verbose {
            self.line(&format!("session: {}", result.session_id));
        }
    }
}

impl<W: Write> Renderer for ConsoleRenderer<W> {
    fn render(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Assistant(event) => self.message(&event.message, None),
            EngineEvent::User(event) => {
                if self.verbosity != Verbosity::Minimal {
                    self.message(&event.message, Some("User"));
                }
            }
            EngineEvent::System(event) => match self.verbosity {
                Verbosity::Minimal => {}
                Verbosity::Medium => self.line(&format!("System: {}", event.subtype)),
                Verbosity::Verbose => {
                    self.line(&format!("System: {}", event.subtype));
                    if !event.data.is_empty() {
                        let pretty = serde_json::to_string_pretty(&event.data)
                            .unwrap_or_else(|_| format!("{:?}", event.data));
                        self.line(&indent(&pretty));
                    }
                }
            },
            EngineEvent::Result(result) => self.result(result),
            EngineEvent::Unknown => {
                if self.verbosity == Verbosity::Verbose {
                    self.line("[unknown event]");
                }
            }
        }
    }

    fn notice(&mut self, text: &str) {
        self.line(text);
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Key argument of well-known tools, or the first argument of anything else.
fn tool_summary(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("");
    match name {
        "Read" | "Write" | "Edit" => {
            let path = field("file_path");
            if path.is_empty() {
                field("filePath").to_string()
            } else {
                path.to_string()
            }
        }
        "Bash" => preview(field("command"), COMMAND_PREVIEW_CHARS),
        "Glob" | "Grep" => field("pattern").to_string(),
        "Task" => field("description").to_string(),
        "TodoWrite" => {
            let count = input
                .get("todos")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            format!("{count} items")
        }
        _ => match input.as_object().and_then(|map| map.iter().next()) {
            Some((key, value)) => {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{key}={}", preview(&value, VALUE_PREVIEW_CHARS))
            }
            None => String::new(),
        },
    }
}

fn tool_result_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item.get("type").and_then(Value::as_str) {
                Some("text") => item
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                _ => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
