//! Coordination state inferred from task and team documents.
//!
//! Every function here is pure: the same document text always yields the same
//! state. Ambiguous input falls back to the most conservative state instead of
//! failing, because documents are edited concurrently by other agents and may
//! be observed half-written.

use serde::Serialize;

use crate::core::fields::{lookup_assignment, lookup_field};

/// Heading names recognized in coordination documents.
pub mod field {
    pub const STATUS: &str = "Status";
    pub const ASSIGNED_TO: &str = "Assigned To";
    pub const ASSIGNED_TASK: &str = "Assigned Task";
}

/// Progress of a single task document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
}

impl TaskState {
    /// Classify a task `Status` value. Unknown or absent values are `Pending`.
    pub fn from_status(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return TaskState::Pending;
        };
        let lower = status.to_lowercase();
        if lower.contains("completed") {
            TaskState::Completed
        } else if lower.contains("in progress") || lower.contains("in_progress") {
            TaskState::InProgress
        } else {
            TaskState::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::InProgress => "IN_PROGRESS",
            TaskState::Completed => "COMPLETED",
        }
    }
}

/// Availability of a team member, derived from their team document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberState {
    NotRegistered,
    Available,
    Assigned,
    Working,
}

impl MemberState {
    /// Classify a member document's `Status`.
    ///
    /// A member whose document exists is registered, so unknown or absent
    /// values map to `Available`.
    pub fn from_status(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return MemberState::Available;
        };
        let lower = status.to_lowercase();
        if lower.contains("working") {
            MemberState::Working
        } else if lower.contains("assigned") {
            MemberState::Assigned
        } else {
            MemberState::Available
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemberState::NotRegistered => "NOT_REGISTERED",
            MemberState::Available => "AVAILABLE",
            MemberState::Assigned => "ASSIGNED",
            MemberState::Working => "WORKING",
        }
    }
}

/// What the manager should be doing, given the whole project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagerState {
    /// No tasks exist yet.
    Initial,
    /// At least one pending task and one available member.
    Assigning,
    /// Work is outstanding but there is nothing to hand out right now.
    Monitoring,
    /// Every known task is completed.
    Completed,
}

impl ManagerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ManagerState::Initial => "INITIAL",
            ManagerState::Assigning => "ASSIGNING",
            ManagerState::Monitoring => "MONITORING",
            ManagerState::Completed => "COMPLETED",
        }
    }
}

/// Task document fields that matter for coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub status: TaskState,
    pub assignee: Option<String>,
}

impl TaskRecord {
    /// Parse a task document. A missing document is a pending, unassigned task.
    pub fn from_document(document: Option<&str>) -> Self {
        let Some(doc) = document else {
            return Self {
                status: TaskState::Pending,
                assignee: None,
            };
        };
        Self {
            status: TaskState::from_status(lookup_field(doc, field::STATUS).as_deref()),
            assignee: lookup_assignment(doc, field::ASSIGNED_TO),
        }
    }
}

/// Team member document fields that matter for coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub status: MemberState,
    pub assigned_task: Option<String>,
}

impl MemberRecord {
    /// Parse a team document. A missing document means the member never registered.
    pub fn from_document(document: Option<&str>) -> Self {
        let Some(doc) = document else {
            return Self {
                status: MemberState::NotRegistered,
                assigned_task: None,
            };
        };
        Self {
            status: MemberState::from_status(lookup_field(doc, field::STATUS).as_deref()),
            assigned_task: lookup_assignment(doc, field::ASSIGNED_TASK),
        }
    }
}

/// Aggregate manager state over every known task and member.
///
/// `Monitoring` covers both "pending tasks but nobody available" and "nothing
/// pending but work still in progress"; callers poll at the same cadence for
/// both.
pub fn manager_state(tasks: &[TaskState], members: &[MemberState]) -> ManagerState {
    if tasks.is_empty() {
        return ManagerState::Initial;
    }
    if tasks.iter().all(|state| *state == TaskState::Completed) {
        return ManagerState::Completed;
    }
    let has_pending = tasks.contains(&TaskState::Pending);
    let has_available = members.contains(&MemberState::Available);
    if has_pending && has_available {
        ManagerState::Assigning
    } else {
        ManagerState::Monitoring
    }
}
