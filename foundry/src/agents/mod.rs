//! Agent roles driven by the turn loop.
//!
//! [`AgentBehavior`] is the seam between the generic loop in
//! [`crate::looping`] and a concrete role: the loop owns sessions, statuses,
//! interrupts and human input; the behavior only chooses prompts and decides
//! when the work is done.

use std::time::Duration;

use anyhow::Result;

use crate::io::engine::TurnResult;
use crate::io::status::StatusReporter;

pub mod manager;
pub mod programmer;

/// Role-specific decisions consulted by the agent loop.
pub trait AgentBehavior {
    /// Personality and standing instructions sent with every turn.
    fn system_prompt(&self) -> Result<String>;

    /// Prompt for the first turn of this process.
    fn initial_prompt(&mut self) -> Result<String>;

    /// Checked after every turn; `true` ends the loop successfully.
    fn is_complete(&mut self, result: &TurnResult) -> Result<bool>;

    /// Prompt for the next turn when the reply did not need a human.
    fn continuation_prompt(&mut self) -> Result<String>;

    /// How long to wait before the continuation prompt. `None` continues at once.
    fn idle_interval(&mut self) -> Result<Option<Duration>> {
        Ok(None)
    }

    /// Called with the text of each assistant message as it streams in.
    fn on_assistant_text(&mut self, _text: &str) {}

    /// Called once per turn with the result event, before [`Self::is_complete`].
    fn on_result(&mut self, _result: &TurnResult, _status: &StatusReporter) -> Result<()> {
        Ok(())
    }
}
