//! Session records that let an agent resume its engine conversation after a restart.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::identity::AgentIdentity;
use crate::io::atomic::write_json_atomic;

/// Persisted engine session for one agent identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub agent_name: String,
    pub agent_type: String,
    pub prefix: String,
    pub last_run: DateTime<Utc>,
    pub num_turns: u32,
    pub total_cost_usd: Option<f64>,
}

impl SessionRecord {
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(&self.prefix, &self.agent_type, &self.agent_name)
    }
}

/// Directory of session files, one per agent identity.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identity: &AgentIdentity) -> PathBuf {
        self.dir.join(identity.session_file_name())
    }

    /// Load the saved session, or `None` when it is missing or unreadable.
    ///
    /// Corrupt files are reported and otherwise treated as absent.
    pub fn get(&self, identity: &AgentIdentity) -> Option<SessionRecord> {
        let path = self.path_for(identity);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), err = %err, "unreadable session file");
                return None;
            }
        };
        match serde_json::from_str::<SessionRecord>(&contents) {
            Ok(record) => {
                debug!(path = %path.display(), session_id = %record.session_id, "session loaded");
                Some(record)
            }
            Err(err) => {
                warn!(path = %path.display(), err = %err, "corrupt session file, ignoring");
                None
            }
        }
    }

    /// Overwrite the record for the identity it names.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let path = self.path_for(&record.identity());
        debug!(path = %path.display(), session_id = %record.session_id, num_turns = record.num_turns, "saving session");
        write_json_atomic(&path, record).with_context(|| format!("save session {}", path.display()))
    }

    /// Remove the saved session. Returns true iff a file was removed.
    pub fn delete(&self, identity: &AgentIdentity) -> Result<bool> {
        let path = self.path_for(identity);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "session deleted");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("delete session {}", path.display())),
        }
    }

    /// Build a record stamped with the current time.
    pub fn new_record(
        identity: &AgentIdentity,
        session_id: &str,
        num_turns: u32,
        total_cost_usd: Option<f64>,
    ) -> SessionRecord {
        SessionRecord {
            session_id: session_id.to_string(),
            agent_name: identity.agent_name.clone(),
            agent_type: identity.agent_type.clone(),
            prefix: identity.project.clone(),
            last_run: Utc::now(),
            num_turns,
            total_cost_usd,
        }
    }
}

/// Human-readable summary shown when asking whether to resume.
pub fn format_session(record: &SessionRecord) -> String {
    let last_run = record
        .last_run
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S");
    let mut lines = vec![
        format!("  Last run: {last_run}"),
        format!("  Turns: {}", record.num_turns),
    ];
    if let Some(cost) = record.total_cost_usd {
        lines.push(format!("  Cost: ${cost:.4}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> AgentIdentity {
        AgentIdentity::new("app", "programmer", "Alice Chen")
    }

    #[test]
    fn save_then_get_returns_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path().join("sessions"));
        let record = SessionStore::new_record(&identity(), "sess-1", 4, Some(0.25));

        store.save(&record).expect("save");
        let loaded = store.get(&identity()).expect("record");

        assert_eq!(loaded, record);
    }

    #[test]
    fn get_missing_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        assert!(store.get(&identity()).is_none());
    }

    #[test]
    fn get_corrupt_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        fs::write(store.path_for(&identity()), "{\"session_id\": \"abc\", ").expect("write");
        assert!(store.get(&identity()).is_none());
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());

        assert!(!store.delete(&identity()).expect("delete missing"));

        let record = SessionStore::new_record(&identity(), "sess-2", 1, None);
        store.save(&record).expect("save");
        assert!(store.delete(&identity()).expect("delete existing"));
        assert!(store.get(&identity()).is_none());
        assert!(!store.delete(&identity()).expect("delete again"));
    }

    #[test]
    fn session_file_uses_expected_json_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        let record = SessionStore::new_record(&identity(), "sess-3", 2, None);
        store.save(&record).expect("save");

        let raw = fs::read_to_string(store.path_for(&identity())).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        for key in [
            "session_id",
            "agent_name",
            "agent_type",
            "prefix",
            "last_run",
            "num_turns",
            "total_cost_usd",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["total_cost_usd"].is_null());
    }

    #[test]
    fn format_session_includes_cost_when_known() {
        let record = SessionStore::new_record(&identity(), "sess-4", 12, Some(1.5));
        let text = format_session(&record);
        assert!(text.contains("Turns: 12"));
        assert!(text.contains("Cost: $1.5000"));
    }
}
