//! Conversational engine abstraction.
//!
//! The [`Engine`] trait decouples the agent loop from the backend that runs a
//! turn (currently the `claude` CLI in stream-json mode). A turn takes a prompt
//! and yields a stream of typed events ending in a [`TurnResult`]. Tests use
//! scripted engines that replay predetermined events without spawning processes.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::io::config::EngineConfig;
use crate::io::process::{ChildGroups, isolate_process_group, spawn_line_stream};

/// One prompt submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    pub system_prompt: String,
    /// Session to continue, if any.
    pub resume: Option<String>,
    pub workdir: Option<PathBuf>,
}

/// Events produced while a turn runs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    System(SystemEvent),
    Assistant(MessageEvent),
    User(MessageEvent),
    Result(TurnResult),
    /// Event types this crate does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SystemEvent {
    #[serde(default)]
    pub subtype: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageEvent {
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub content: MessageContent,
}

impl Message {
    /// Text blocks joined by newlines; thinking and tool blocks are ignored.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

/// Terminal event of a turn.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnResult {
    #[serde(default)]
    pub subtype: String,
    pub session_id: String,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl TurnResult {
    pub fn result_text(&self) -> &str {
        self.result.as_deref().unwrap_or("")
    }
}

/// Events of one turn, in order. The stream ends after the result event or on error.
pub type EventStream<'a> = Box<dyn Iterator<Item = Result<EngineEvent>> + 'a>;

/// Abstraction over conversational engine backends.
pub trait Engine {
    /// Start a turn. The returned stream must be drained (or dropped) before the next submit.
    fn submit(&self, request: &TurnRequest) -> Result<EventStream<'_>>;
}

/// Parse one stream-json line. Blank lines and unknown event types yield `None`.
pub fn parse_event_line(line: &str) -> Result<Option<EngineEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event: EngineEvent = serde_json::from_str(line)
        .with_context(|| format!("parse engine event {}", truncate_for_log(line)))?;
    match event {
        EngineEvent::Unknown => {
            debug!(line = %truncate_for_log(line), "skipping unknown engine event");
            Ok(None)
        }
        event => Ok(Some(event)),
    }
}

fn truncate_for_log(line: &str) -> &str {
    match line.char_indices().nth(200) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Engine that spawns the `claude` CLI in print mode with stream-json output.
#[derive(Debug, Clone)]
pub struct ClaudeEngine {
    config: EngineConfig,
    children: ChildGroups,
}

impl ClaudeEngine {
    /// Running turns are registered in `children` so a hard stop can kill them.
    pub fn new(config: EngineConfig, children: ChildGroups) -> Self {
        Self { config, children }
    }

    fn command(&self, request: &TurnRequest) -> Result<Command> {
        let (program, leading) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("engine.command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--permission-mode")
            .arg(&self.config.permission_mode);
        if !self.config.allowed_tools.is_empty() {
            cmd.arg("--allowedTools")
                .arg(self.config.allowed_tools.join(","));
        }
        if let Some(model) = &self.config.model {
            cmd.arg("--model").arg(model);
        }
        if !request.system_prompt.is_empty() {
            cmd.arg("--system-prompt").arg(&request.system_prompt);
        }
        if let Some(session_id) = &request.resume {
            cmd.arg("--resume").arg(session_id);
        }
        if let Some(workdir) = &request.workdir {
            cmd.current_dir(workdir);
        }
        isolate_process_group(&mut cmd);
        Ok(cmd)
    }
}

impl Engine for ClaudeEngine {
    #[instrument(skip_all, fields(resume = request.resume.is_some()))]
    fn submit(&self, request: &TurnRequest) -> Result<EventStream<'_>> {
        info!(resume = ?request.resume, "starting engine turn");
        let cmd = self.command(request)?;
        let lines = spawn_line_stream(cmd, request.prompt.as_bytes(), &self.children)
            .context("run engine")?;

        let mut saw_result = false;
        let events = lines.filter_map(move |line| {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "engine stream failed");
                    return Some(Err(err));
                }
            };
            if saw_result {
                return None;
            }
            match parse_event_line(&line) {
                Ok(Some(event)) => {
                    if matches!(event, EngineEvent::Result(_)) {
                        saw_result = true;
                    }
                    Some(Ok(event))
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "skipping unparseable engine output");
                    None
                }
            }
        });
        Ok(Box::new(events))
    }
}
