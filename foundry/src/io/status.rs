//! Heartbeat status files read by monitors and peer agents.
//!
//! Each agent owns exactly one status file and is its only writer. Updates are
//! additive: fields not mentioned in an update survive from the previous record.
//! Writes go through temp-file + rename, and reads treat anything unparseable as
//! "no data", so a concurrent reader never fails because of a writer.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::identity::AgentIdentity;
use crate::io::atomic::write_json_atomic;

/// Prefix reserved for terminal statuses (`exited:success`, `exited:error`, ...).
pub const EXITED_PREFIX: &str = "exited:";

/// Default age after which a heartbeat is considered stale.
pub const STALE_THRESHOLD: Duration = Duration::from_secs(300);

const STATUS_EXTENSION: &str = "status";

/// Reserved keys that extension fields may not shadow.
const CORE_KEYS: [&str; 8] = [
    "status",
    "details",
    "last_update",
    "started_at",
    "pid",
    "agent_type",
    "name",
    "project",
];

/// Terminal and well-known statuses written by the agent loop.
pub mod statuses {
    pub const STARTING: &str = "starting";
    pub const RUNNING: &str = "running";
    pub const WAITING_INPUT: &str = "waiting_input";
    pub const IDLE: &str = "idle";
    pub const EXITED_SUCCESS: &str = "exited:success";
    pub const EXITED_TERMINATED: &str = "exited:terminated";
    pub const EXITED_ERROR: &str = "exited:error";
}

/// One agent's heartbeat record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusRecord {
    pub status: String,
    #[serde(default)]
    pub details: String,
    pub last_update: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Free-form fields such as `current_task`, serialized flat alongside the core fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StatusRecord {
    pub fn is_exited(&self) -> bool {
        self.status.starts_with(EXITED_PREFIX)
    }

    /// Age of the last heartbeat relative to `now` (zero if the clock went backwards).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_update).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Fields to layer onto a status record.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: String,
    pub details: String,
    pub agent_type: Option<String>,
    pub name: Option<String>,
    pub project: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl StatusUpdate {
    pub fn new(status: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            details: details.into(),
            ..Self::default()
        }
    }

    pub fn identity(mut self, identity: &AgentIdentity) -> Self {
        self.agent_type = Some(identity.agent_type.clone());
        self.name = Some(identity.agent_name.clone());
        self.project = Some(identity.project.clone());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Merge `update` over the record at `path` and write it atomically.
///
/// Stamps `last_update` and `pid`, and sets `started_at` only when the
/// previous record has none. Returns the record as written.
pub fn update_status(path: &Path, update: StatusUpdate) -> Result<StatusRecord> {
    let now = Utc::now();
    let previous = read_status(path);
    let mut record = match previous {
        Some(prev) => prev,
        None => StatusRecord {
            status: String::new(),
            details: String::new(),
            last_update: now,
            started_at: now,
            pid: std::process::id(),
            agent_type: None,
            name: None,
            project: None,
            extra: BTreeMap::new(),
        },
    };

    record.status = update.status;
    record.details = update.details;
    record.last_update = now;
    record.pid = std::process::id();
    if update.agent_type.is_some() {
        record.agent_type = update.agent_type;
    }
    if update.name.is_some() {
        record.name = update.name;
    }
    if update.project.is_some() {
        record.project = update.project;
    }
    for (key, value) in update.extra {
        if CORE_KEYS.contains(&key.as_str()) {
            warn!(key = %key, "ignoring extension field that shadows a core status field");
            continue;
        }
        record.extra.insert(key, value);
    }

    debug!(path = %path.display(), status = %record.status, "writing status");
    write_json_atomic(path, &record)
        .with_context(|| format!("write status {}", path.display()))?;
    Ok(record)
}

/// Read a status file, returning `None` when it is missing or unparseable.
pub fn read_status(path: &Path) -> Option<StatusRecord> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable status file");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "invalid status file, treating as absent");
            None
        }
    }
}

/// True when the heartbeat is older than `threshold`, or when there is no readable record.
pub fn is_stale(path: &Path, threshold: Duration) -> bool {
    match read_status(path) {
        Some(record) => record.age(Utc::now()) > threshold,
        None => true,
    }
}

/// True when the record's status starts with `exited:`.
pub fn is_exited(path: &Path) -> bool {
    read_status(path).is_some_and(|record| record.is_exited())
}

pub fn pid_of(path: &Path) -> Option<u32> {
    read_status(path).map(|record| record.pid)
}

/// Every readable status file in `dir`, sorted by path.
pub fn list_statuses(dir: &Path) -> Result<Vec<(PathBuf, StatusRecord)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == STATUS_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths
        .into_iter()
        .filter_map(|path| read_status(&path).map(|record| (path, record)))
        .collect())
}

/// Status writer bound to a single agent's file and identity.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    path: PathBuf,
    identity: AgentIdentity,
}

impl StatusReporter {
    pub fn new(path: PathBuf, identity: AgentIdentity) -> Self {
        Self { path, identity }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update(&self, status: &str, details: &str) -> Result<StatusRecord> {
        self.update_with(StatusUpdate::new(status, details))
    }

    /// Apply `update`, filling in this agent's identity fields.
    pub fn update_with(&self, update: StatusUpdate) -> Result<StatusRecord> {
        update_status(&self.path, update.identity(&self.identity))
    }

    pub fn read(&self) -> Option<StatusRecord> {
        read_status(&self.path)
    }
}
