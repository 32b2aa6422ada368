//! Manager role: turns the project description into tasks, hands them out and
//! watches them through to completion.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use minijinja::context;
use tracing::info;

use crate::agents::AgentBehavior;
use crate::core::coordination::ManagerState;
use crate::io::engine::TurnResult;
use crate::io::paths::planning_dir_for;
use crate::io::planning::PlanningDir;
use crate::io::prompt::{PromptEngine, Template};
use crate::io::status::{StatusReporter, StatusUpdate, statuses};

pub const AGENT_TYPE: &str = "manager";
pub const DEFAULT_NAME: &str = "Alice Chen";

pub struct ManagerBehavior {
    name: String,
    planning: PlanningDir,
    prompts: PromptEngine,
    poll_interval: Option<Duration>,
    /// Set once the final summary prompt has been handed out.
    summary_requested: bool,
}

impl ManagerBehavior {
    pub fn new(name: &str, project_dir: &Path, poll_interval: Option<Duration>) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            planning: PlanningDir::new(planning_dir_for(project_dir)),
            prompts: PromptEngine::new()?,
            poll_interval,
            summary_requested: false,
        })
    }

    fn next_prompt(&mut self) -> Result<String> {
        let state = self.planning.manager_state()?;
        info!(state = state.as_str(), "manager state");
        let template = match state {
            ManagerState::Initial => Template::ManagerInitial,
            ManagerState::Assigning => Template::ManagerAssigning,
            ManagerState::Monitoring => Template::ManagerMonitoring,
            ManagerState::Completed => {
                self.summary_requested = true;
                Template::ManagerCompleted
            }
        };
        self.prompts.render(
            template,
            context! { planning_dir => self.planning.root().display().to_string() },
        )
    }
}

impl AgentBehavior for ManagerBehavior {
    fn system_prompt(&self) -> Result<String> {
        self.prompts
            .render(Template::ManagerSystem, context! { name => self.name.as_str() })
    }

    fn initial_prompt(&mut self) -> Result<String> {
        self.next_prompt()
    }

    /// Done once the summary turn has run.
    fn is_complete(&mut self, _result: &TurnResult) -> Result<bool> {
        Ok(self.summary_requested)
    }

    fn continuation_prompt(&mut self) -> Result<String> {
        self.next_prompt()
    }

    fn idle_interval(&mut self) -> Result<Option<Duration>> {
        let state = self.planning.manager_state()?;
        Ok(match state {
            ManagerState::Monitoring => self.poll_interval,
            _ => None,
        })
    }

    fn on_result(&mut self, result: &TurnResult, status: &StatusReporter) -> Result<()> {
        let state = self.planning.manager_state()?;
        status.update_with(
            StatusUpdate::new(
                statuses::RUNNING,
                format!("Project state: {}", state.as_str()),
            )
            .field("project_state", state.as_str())
            .field("num_turns", result.num_turns),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{PlanningFixture, turn_result};

    fn manager(fixture: &PlanningFixture) -> ManagerBehavior {
        ManagerBehavior::new("Alice Chen", fixture.project_dir(), Some(Duration::from_secs(30)))
            .expect("manager")
    }

    #[test]
    fn empty_project_asks_for_tasks() {
        let fixture = PlanningFixture::new().expect("fixture");
        let mut manager = manager(&fixture);

        let prompt = manager.initial_prompt().expect("prompt");
        assert!(prompt.contains("PROJECT.md"));
        assert!(!manager.is_complete(&turn_result("s1")).expect("complete"));
        assert_eq!(manager.idle_interval().expect("idle"), None);
    }

    #[test]
    fn assigning_prompt_when_work_and_people_are_free() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture.task("task-001.md", "PENDING", None).expect("task");
        fixture.member("Bob", "AVAILABLE", None).expect("member");
        let mut manager = manager(&fixture);

        let prompt = manager.continuation_prompt().expect("prompt");
        assert!(prompt.contains("assign one pending task"));
    }

    #[test]
    fn monitoring_polls_at_configured_interval() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture
            .task("task-001.md", "IN_PROGRESS", Some("Bob"))
            .expect("task");
        fixture
            .member("Bob", "WORKING", Some("task-001.md"))
            .expect("member");
        let mut manager = manager(&fixture);

        assert!(manager.continuation_prompt().expect("prompt").contains("Report on overall progress"));
        assert_eq!(
            manager.idle_interval().expect("idle"),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn completed_project_runs_one_summary_turn() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture
            .task("task-001.md", "COMPLETED", Some("Bob"))
            .expect("task");
        let mut manager = manager(&fixture);

        assert!(!manager.is_complete(&turn_result("s1")).expect("before"));
        let prompt = manager.continuation_prompt().expect("prompt");
        assert!(prompt.contains("final project summary"));
        assert!(manager.is_complete(&turn_result("s1")).expect("after"));
    }

    #[test]
    fn system_prompt_names_the_manager() {
        let fixture = PlanningFixture::new().expect("fixture");
        let manager = manager(&fixture);
        assert!(manager.system_prompt().expect("system").starts_with("You are Alice Chen"));
    }

    #[test]
    fn on_result_records_project_state() {
        let fixture = PlanningFixture::new().expect("fixture");
        let mut manager = manager(&fixture);
        let identity = crate::core::identity::AgentIdentity::new("app", AGENT_TYPE, "Alice Chen");
        let reporter = StatusReporter::new(fixture.root().join("manager.status"), identity);

        manager
            .on_result(&turn_result("s1"), &reporter)
            .expect("on_result");
        let record = reporter.read().expect("status");
        assert_eq!(record.status, statuses::RUNNING);
        assert_eq!(record.extra["project_state"], "INITIAL");
    }
}
