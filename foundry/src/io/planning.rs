//! Reads the shared planning directory (`tasks/` and `team/`) that agents coordinate through.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::coordination::{
    ManagerState, MemberRecord, MemberState, TaskRecord, TaskState, manager_state,
};
use crate::core::naming::sanitize_name;

const TASKS_DIR: &str = "tasks";
const TEAM_DIR: &str = "team";
const TEMPLATE_FILE: &str = "template.md";

/// A parsed coordination document and the file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry<T> {
    pub file_name: String,
    pub record: T,
}

/// Snapshot of every task and member record, plus the aggregate state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSnapshot {
    pub tasks: Vec<Entry<TaskRecord>>,
    pub members: Vec<Entry<MemberRecord>>,
    pub manager: ManagerState,
}

/// Handle on one project's planning directory.
#[derive(Debug, Clone)]
pub struct PlanningDir {
    root: PathBuf,
}

impl PlanningDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(TASKS_DIR)
    }

    pub fn team_dir(&self) -> PathBuf {
        self.root.join(TEAM_DIR)
    }

    /// `team/{sanitized name}.md`.
    pub fn member_path(&self, agent_name: &str) -> PathBuf {
        self.team_dir()
            .join(format!("{}.md", sanitize_name(agent_name)))
    }

    pub fn task_path(&self, file_name: &str) -> PathBuf {
        self.tasks_dir().join(file_name)
    }

    /// The named member's record. Missing or unreadable documents are `NotRegistered`.
    pub fn member_record(&self, agent_name: &str) -> MemberRecord {
        let doc = read_document(&self.member_path(agent_name));
        MemberRecord::from_document(doc.as_deref())
    }

    /// The named task's record. Missing or unreadable documents are `Pending`.
    pub fn task_record(&self, file_name: &str) -> TaskRecord {
        let doc = read_document(&self.task_path(file_name));
        TaskRecord::from_document(doc.as_deref())
    }

    /// Every task document, sorted by file name.
    pub fn tasks(&self) -> Result<Vec<Entry<TaskRecord>>> {
        let mut entries = Vec::new();
        for path in list_documents(&self.tasks_dir())? {
            // Unreadable tasks stay in the set as Pending.
            let doc = read_document(&path);
            entries.push(Entry {
                file_name: file_name_of(&path),
                record: TaskRecord::from_document(doc.as_deref()),
            });
        }
        Ok(entries)
    }

    /// Every team document, sorted by file name.
    pub fn members(&self) -> Result<Vec<Entry<MemberRecord>>> {
        let mut entries = Vec::new();
        for path in list_documents(&self.team_dir())? {
            let Some(doc) = read_document(&path) else {
                continue;
            };
            entries.push(Entry {
                file_name: file_name_of(&path),
                record: MemberRecord::from_document(Some(&doc)),
            });
        }
        Ok(entries)
    }

    pub fn task_states(&self) -> Result<Vec<TaskState>> {
        Ok(self.tasks()?.into_iter().map(|e| e.record.status).collect())
    }

    pub fn member_states(&self) -> Result<Vec<MemberState>> {
        Ok(self.members()?.into_iter().map(|e| e.record.status).collect())
    }

    /// Recompute the aggregate manager state from the current documents.
    pub fn manager_state(&self) -> Result<ManagerState> {
        let state = manager_state(&self.task_states()?, &self.member_states()?);
        debug!(root = %self.root.display(), state = state.as_str(), "manager state");
        Ok(state)
    }

    pub fn snapshot(&self) -> Result<ProjectSnapshot> {
        let tasks = self.tasks()?;
        let members = self.members()?;
        let task_states: Vec<TaskState> = tasks.iter().map(|e| e.record.status).collect();
        let member_states: Vec<MemberState> = members.iter().map(|e| e.record.status).collect();
        let manager = manager_state(&task_states, &member_states);
        Ok(ProjectSnapshot {
            tasks,
            members,
            manager,
        })
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `*.md` files in `dir` except the reserved template, sorted. A missing dir is empty.
fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read {}", dir.display())),
    };
    let mut paths = Vec::new();
    for entry in read {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        if file_name_of(&path).eq_ignore_ascii_case(TEMPLATE_FILE) {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

fn read_document(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(doc) => Some(doc),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable coordination document");
            None
        }
    }
}
