//! Agent identity and the record file names derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::naming::sanitize_name;

/// Name used when an agent type runs a single unnamed instance.
pub const DEFAULT_AGENT_NAME: &str = "default";

/// Who an agent process is: fixed for the lifetime of the process.
///
/// Session and status file names are pure functions of this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Project namespace shared by cooperating agents.
    pub project: String,
    /// Role, e.g. `manager` or `programmer`.
    pub agent_type: String,
    /// Instance name, e.g. `Alice Chen`.
    pub agent_name: String,
}

impl AgentIdentity {
    pub fn new(
        project: impl Into<String>,
        agent_type: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            agent_type: agent_type.into(),
            agent_name: agent_name.into(),
        }
    }

    /// `{agent_type}-{name}-{project}.json`, all slugged.
    pub fn session_file_name(&self) -> String {
        format!(
            "{}-{}-{}.json",
            sanitize_name(&self.agent_type),
            sanitize_name(&self.agent_name),
            sanitize_name(&self.project)
        )
    }

    /// `{agent_type}.status`, or `{agent_type}-{name}.status` for named instances.
    pub fn status_file_name(&self) -> String {
        let agent_type = sanitize_name(&self.agent_type);
        if self.has_distinct_name() {
            format!("{agent_type}-{}.status", sanitize_name(&self.agent_name))
        } else {
            format!("{agent_type}.status")
        }
    }

    /// Directory (under the status root) holding this project's status files.
    pub fn project_dir_name(&self) -> String {
        sanitize_name(&self.project)
    }

    fn has_distinct_name(&self) -> bool {
        !self.agent_name.is_empty()
            && self.agent_name != self.agent_type
            && self.agent_name != DEFAULT_AGENT_NAME
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({})",
            self.project, self.agent_type, self.agent_name
        )
    }
}
