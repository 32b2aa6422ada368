//! Programmer role: registers with the team, waits for an assignment and works
//! the assigned task until it is completed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use minijinja::context;
use serde_json::Value;
use tracing::info;

use crate::agents::AgentBehavior;
use crate::core::coordination::{ManagerState, MemberRecord, MemberState};
use crate::core::naming::sanitize_name;
use crate::io::engine::TurnResult;
use crate::io::paths::planning_dir_for;
use crate::io::planning::PlanningDir;
use crate::io::prompt::{PromptEngine, Template};
use crate::io::status::{StatusReporter, StatusUpdate, statuses};

pub const AGENT_TYPE: &str = "programmer";
pub const DEFAULT_NAME: &str = "John Doe";

pub struct ProgrammerBehavior {
    name: String,
    project_dir: PathBuf,
    planning: PlanningDir,
    prompts: PromptEngine,
    poll_interval: Option<Duration>,
}

impl ProgrammerBehavior {
    pub fn new(name: &str, project_dir: &Path, poll_interval: Option<Duration>) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            project_dir: project_dir.to_path_buf(),
            planning: PlanningDir::new(planning_dir_for(project_dir)),
            prompts: PromptEngine::new()?,
            poll_interval,
        })
    }

    fn record(&self) -> MemberRecord {
        self.planning.member_record(&self.name)
    }

    fn next_prompt(&mut self) -> Result<String> {
        let record = self.record();
        info!(state = record.status.as_str(), task = ?record.assigned_task, "programmer state");
        let template = match (&record.status, &record.assigned_task) {
            (MemberState::NotRegistered, _) => Template::ProgrammerRegister,
            (MemberState::Assigned | MemberState::Working, Some(_)) => Template::ProgrammerWorking,
            _ => Template::ProgrammerWaiting,
        };
        self.prompts.render(
            template,
            context! {
                planning_dir => self.planning.root().display().to_string(),
                project_dir => self.project_dir.display().to_string(),
                team_file => format!("{}.md", sanitize_name(&self.name)),
                task_file => record.assigned_task.unwrap_or_default(),
            },
        )
    }
}

impl AgentBehavior for ProgrammerBehavior {
    fn system_prompt(&self) -> Result<String> {
        self.prompts
            .render(Template::ProgrammerSystem, context! { name => self.name.as_str() })
    }

    fn initial_prompt(&mut self) -> Result<String> {
        self.next_prompt()
    }

    /// Done when the whole project is completed and nothing is assigned to us.
    fn is_complete(&mut self, _result: &TurnResult) -> Result<bool> {
        if self.record().assigned_task.is_some() {
            return Ok(false);
        }
        Ok(self.planning.manager_state()? == ManagerState::Completed)
    }

    fn continuation_prompt(&mut self) -> Result<String> {
        self.next_prompt()
    }

    fn idle_interval(&mut self) -> Result<Option<Duration>> {
        Ok(match self.record().status {
            MemberState::Available => self.poll_interval,
            _ => None,
        })
    }

    fn on_result(&mut self, result: &TurnResult, status: &StatusReporter) -> Result<()> {
        let record = self.record();
        let details = match &record.assigned_task {
            Some(task) => format!("Working on {task}"),
            None => format!("Team status: {}", record.status.as_str()),
        };
        status.update_with(
            StatusUpdate::new(statuses::RUNNING, details)
                .field("member_state", record.status.as_str())
                .field(
                    "current_task",
                    record.assigned_task.map_or(Value::Null, Value::from),
                )
                .field("num_turns", result.num_turns),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::AgentIdentity;
    use crate::test_support::{PlanningFixture, turn_result};

    fn programmer(fixture: &PlanningFixture) -> ProgrammerBehavior {
        ProgrammerBehavior::new("Bob Smith", fixture.project_dir(), Some(Duration::from_secs(30)))
            .expect("programmer")
    }

    #[test]
    fn unregistered_programmer_registers() {
        let fixture = PlanningFixture::new().expect("fixture");
        let mut programmer = programmer(&fixture);

        let prompt = programmer.initial_prompt().expect("prompt");
        assert!(prompt.contains("team/bob-smith.md"));
        assert_eq!(programmer.idle_interval().expect("idle"), None);
    }

    #[test]
    fn available_programmer_waits_and_polls() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture.member("Bob Smith", "AVAILABLE", None).expect("member");
        let mut programmer = programmer(&fixture);

        let prompt = programmer.continuation_prompt().expect("prompt");
        assert!(prompt.contains("confirm that you are waiting"));
        assert_eq!(
            programmer.idle_interval().expect("idle"),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn assigned_programmer_works_on_task() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture
            .task("task-002.md", "IN_PROGRESS", Some("Bob Smith"))
            .expect("task");
        fixture
            .member("Bob Smith", "ASSIGNED", Some("task-002.md"))
            .expect("member");
        let mut programmer = programmer(&fixture);

        let prompt = programmer.continuation_prompt().expect("prompt");
        assert!(prompt.contains("tasks/task-002.md"));
        assert!(!programmer.is_complete(&turn_result("s1")).expect("complete"));
    }

    #[test]
    fn assigned_without_task_falls_back_to_waiting() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture.member("Bob Smith", "ASSIGNED", None).expect("member");
        let mut programmer = programmer(&fixture);

        let prompt = programmer.continuation_prompt().expect("prompt");
        assert!(prompt.contains("Assigned Task"));
    }

    #[test]
    fn completes_when_project_is_done_and_nothing_assigned() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture
            .task("task-001.md", "COMPLETED", Some("Bob Smith"))
            .expect("task");
        fixture.member("Bob Smith", "AVAILABLE", None).expect("member");
        let mut programmer = programmer(&fixture);

        assert!(programmer.is_complete(&turn_result("s1")).expect("complete"));
    }

    #[test]
    fn on_result_reports_current_task() {
        let fixture = PlanningFixture::new().expect("fixture");
        fixture
            .member("Bob Smith", "WORKING", Some("task-004.md"))
            .expect("member");
        let mut programmer = programmer(&fixture);
        let identity = AgentIdentity::new("app", AGENT_TYPE, "Bob Smith");
        let reporter = StatusReporter::new(fixture.root().join("p.status"), identity);

        programmer
            .on_result(&turn_result("s1"), &reporter)
            .expect("on_result");
        let record = reporter.read().expect("status");
        assert_eq!(record.details, "Working on task-004.md");
        assert_eq!(record.extra["current_task"], "task-004.md");
        assert_eq!(record.extra["member_state"], "WORKING");
    }
}
