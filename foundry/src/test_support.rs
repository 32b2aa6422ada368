//! Test doubles for the agent loop and fixtures for coordination documents.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::agents::AgentBehavior;
use crate::core::classifier::InputClassifier;
use crate::core::naming::sanitize_name;
use crate::interrupt::InterruptController;
use crate::io::console::{HumanInput, InputRead};
use crate::io::engine::{
    Engine, EngineEvent, EventStream, Message, MessageContent, MessageEvent, TurnRequest,
    TurnResult,
};
use crate::io::render::Renderer;
use crate::io::status::StatusReporter;

/// A successful result event for `session_id` with one turn and a fixed cost.
pub fn turn_result(session_id: &str) -> TurnResult {
    TurnResult {
        subtype: "success".to_string(),
        session_id: session_id.to_string(),
        num_turns: 1,
        total_cost_usd: Some(0.01),
        duration_ms: Some(1000),
        result: Some("ok".to_string()),
        is_error: false,
    }
}

/// Assistant event carrying plain text.
pub fn assistant_text(text: &str) -> EngineEvent {
    EngineEvent::Assistant(MessageEvent {
        message: Message {
            content: MessageContent::Text(text.to_string()),
        },
    })
}

/// Temporary `app/` project with an empty `app-planning/{tasks,team}` next to it.
pub struct PlanningFixture {
    temp: TempDir,
    project_dir: PathBuf,
    planning_dir: PathBuf,
}

impl PlanningFixture {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new().context("create temp dir")?;
        let project_dir = temp.path().join("app");
        let planning_dir = temp.path().join("app-planning");
        for dir in [
            project_dir.clone(),
            planning_dir.join("tasks"),
            planning_dir.join("team"),
        ] {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(Self {
            temp,
            project_dir,
            planning_dir,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn planning_dir(&self) -> &Path {
        &self.planning_dir
    }

    /// Write `tasks/{file_name}` with the given status and assignee.
    pub fn task(&self, file_name: &str, status: &str, assignee: Option<&str>) -> Result<()> {
        let body = format!(
            "# Task\n\n## Status\n{status}\n\n## Assigned To\n{}\n",
            assignee.unwrap_or("Unassigned")
        );
        self.write(&self.planning_dir.join("tasks").join(file_name), &body)
    }

    /// Write the team file of `name` with the given status and assigned task.
    pub fn member(&self, name: &str, status: &str, assigned_task: Option<&str>) -> Result<()> {
        let body = format!(
            "# {name}\n\n## Status\n{status}\n\n## Assigned Task\n{}\n",
            assigned_task.unwrap_or("None")
        );
        let path = self
            .planning_dir
            .join("team")
            .join(format!("{}.md", sanitize_name(name)));
        self.write(&path, &body)
    }

    /// Write an arbitrary file relative to the planning directory.
    pub fn raw(&self, relative: &str, body: &str) -> Result<()> {
        self.write(&self.planning_dir.join(relative), body)
    }

    fn write(&self, path: &Path, body: &str) -> Result<()> {
        fs::write(path, body).with_context(|| format!("write {}", path.display()))
    }
}

/// One scripted engine turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Events replayed in order.
    Events(Vec<EngineEvent>),
    /// `submit` itself fails with this message.
    Fail(String),
}

impl ScriptedTurn {
    /// Assistant `text` followed by a successful result for `session_id`.
    pub fn reply(session_id: &str, text: &str) -> Self {
        ScriptedTurn::Events(vec![
            assistant_text(text),
            EngineEvent::Result(turn_result(session_id)),
        ])
    }
}

/// Engine that replays scripted turns and records every request it receives.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    turns: RefCell<VecDeque<ScriptedTurn>>,
    requests: RefCell<Vec<TurnRequest>>,
}

impl ScriptedEngine {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: RefCell::new(turns.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.borrow().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.prompt.clone())
            .collect()
    }
}

impl Engine for ScriptedEngine {
    fn submit(&self, request: &TurnRequest) -> Result<EventStream<'_>> {
        self.requests.borrow_mut().push(request.clone());
        match self.turns.borrow_mut().pop_front() {
            Some(ScriptedTurn::Events(events)) => Ok(Box::new(events.into_iter().map(Ok))),
            Some(ScriptedTurn::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted engine has no more turns")),
        }
    }
}

/// Console that answers from a queue; an exhausted queue behaves like closed input.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    messages: VecDeque<String>,
    confirmations: VecDeque<bool>,
    /// Questions passed to `confirm`, in order.
    pub questions: Vec<String>,
    /// Number of `read_message` calls.
    pub reads: usize,
}

impl ScriptedConsole {
    pub fn new(messages: &[&str], confirmations: &[bool]) -> Self {
        Self {
            messages: messages.iter().map(|m| m.to_string()).collect(),
            confirmations: confirmations.iter().copied().collect(),
            questions: Vec::new(),
            reads: 0,
        }
    }
}

impl HumanInput for ScriptedConsole {
    fn read_message(&mut self, interrupt: &InterruptController) -> Result<InputRead> {
        self.reads += 1;
        if interrupt.shutdown_requested() {
            return Ok(InputRead::Interrupted);
        }
        self.messages
            .pop_front()
            .map(InputRead::Message)
            .ok_or_else(|| anyhow!("console input closed while waiting for a response"))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.questions.push(question.to_string());
        Ok(self.confirmations.pop_front().unwrap_or(false))
    }
}

/// Classifier returning queued verdicts, then `default`.
#[derive(Debug, Default)]
pub struct FixedClassifier {
    verdicts: RefCell<VecDeque<bool>>,
    default: bool,
}

impl FixedClassifier {
    pub fn always(verdict: bool) -> Self {
        Self {
            verdicts: RefCell::new(VecDeque::new()),
            default: verdict,
        }
    }

    pub fn sequence(verdicts: &[bool]) -> Self {
        Self {
            verdicts: RefCell::new(verdicts.iter().copied().collect()),
            default: false,
        }
    }
}

impl InputClassifier for FixedClassifier {
    fn needs_input(&self, _text: &str) -> bool {
        self.verdicts.borrow_mut().pop_front().unwrap_or(self.default)
    }
}

/// Renderer that keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub events: Vec<EngineEvent>,
    pub notices: Vec<String>,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, event: &EngineEvent) {
        self.events.push(event.clone());
    }

    fn notice(&mut self, text: &str) {
        self.notices.push(text.to_string());
    }
}

/// Behavior with fixed prompts that completes after a number of results.
#[derive(Debug, Default)]
pub struct ScriptedBehavior {
    /// Report completion once this many results were seen; `None` never completes.
    pub complete_after: Option<u32>,
    pub idle: Option<Duration>,
    pub results_seen: u32,
    pub assistant_texts: Vec<String>,
}

impl ScriptedBehavior {
    pub fn never_completes() -> Self {
        Self::default()
    }

    pub fn completes_after(results: u32) -> Self {
        Self {
            complete_after: Some(results),
            ..Self::default()
        }
    }
}

impl AgentBehavior for ScriptedBehavior {
    fn system_prompt(&self) -> Result<String> {
        Ok("You are a test agent.".to_string())
    }

    fn initial_prompt(&mut self) -> Result<String> {
        Ok("start".to_string())
    }

    fn is_complete(&mut self, _result: &TurnResult) -> Result<bool> {
        Ok(self
            .complete_after
            .is_some_and(|after| self.results_seen >= after))
    }

    fn continuation_prompt(&mut self) -> Result<String> {
        Ok(format!("continue {}", self.results_seen))
    }

    fn idle_interval(&mut self) -> Result<Option<Duration>> {
        Ok(self.idle)
    }

    fn on_assistant_text(&mut self, text: &str) {
        self.assistant_texts.push(text.to_string());
    }

    fn on_result(&mut self, _result: &TurnResult, _status: &StatusReporter) -> Result<()> {
        self.results_seen += 1;
        Ok(())
    }
}
