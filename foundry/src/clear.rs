//! `foundry clear`: remove saved sessions and status files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::naming::sanitize_name;
use crate::io::paths::FoundryPaths;
use crate::io::sessions::SessionRecord;

/// What `clear` removed, or would remove on a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub sessions: Vec<PathBuf>,
    pub statuses: Vec<PathBuf>,
    /// Project status directories left empty and removed.
    pub dirs: Vec<PathBuf>,
}

impl ClearReport {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.statuses.is_empty()
    }
}

/// Remove session and status files for `project`, or for everything when `None`.
pub fn clear(paths: &FoundryPaths, project: Option<&str>, dry_run: bool) -> Result<ClearReport> {
    let wanted = project.map(sanitize_name);
    let sessions = files_with_extension(&paths.sessions_dir, "json")?
        .into_iter()
        .filter(|path| match &wanted {
            Some(wanted) => session_project(path).is_some_and(|p| &p == wanted),
            None => true,
        })
        .collect::<Vec<_>>();

    let status_dirs = match project {
        Some(project) => vec![paths.project_status_dir(project)],
        None => subdirs(&paths.status_root)?,
    };
    let mut statuses = Vec::new();
    for dir in &status_dirs {
        statuses.extend(files_with_extension(dir, "status")?);
    }

    let mut report = ClearReport {
        sessions,
        statuses,
        dirs: Vec::new(),
    };
    if dry_run {
        debug!(
            sessions = report.sessions.len(),
            statuses = report.statuses.len(),
            "dry run, nothing removed"
        );
        return Ok(report);
    }

    for path in report.sessions.iter().chain(&report.statuses) {
        remove_file(path)?;
    }
    for dir in status_dirs {
        if is_empty_dir(&dir)? {
            fs::remove_dir(&dir).with_context(|| format!("remove {}", dir.display()))?;
            report.dirs.push(dir);
        }
    }
    info!(
        sessions = report.sessions.len(),
        statuses = report.statuses.len(),
        "cleared agent records"
    );
    Ok(report)
}

/// Slugged project recorded inside a session file. A `-{project}.json` file
/// suffix is ambiguous (`app` vs `my-app`).
fn session_project(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<SessionRecord>(&contents) {
        Ok(record) => Some(sanitize_name(&record.prefix)),
        Err(err) => {
            debug!(path = %path.display(), err = %err, "skipping unparseable session file");
            None
        }
    }
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read entry in {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let mut entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
    Ok(entries.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::AgentIdentity;
    use crate::io::sessions::SessionStore;
    use crate::io::status::{StatusReporter, statuses};

    fn seed(paths: &FoundryPaths) {
        let store = SessionStore::new(paths.sessions_dir.clone());
        for (project, agent_type, name) in [
            ("app", "manager", "Alice Chen"),
            ("app", "programmer", "Bob"),
            ("web", "programmer", "Bob"),
        ] {
            let identity = AgentIdentity::new(project, agent_type, name);
            store
                .save(&SessionStore::new_record(&identity, "s", 1, None))
                .expect("session");
            StatusReporter::new(paths.status_path(&identity), identity)
                .update(statuses::RUNNING, "busy")
                .expect("status");
        }
    }

    #[test]
    fn dry_run_reports_without_removing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(temp.path());
        seed(&paths);

        let report = clear(&paths, None, true).expect("clear");
        assert_eq!(report.sessions.len(), 3);
        assert_eq!(report.statuses.len(), 3);
        assert!(report.dirs.is_empty());
        assert!(report.sessions.iter().all(|path| path.exists()));
    }

    #[test]
    fn project_scope_leaves_other_projects() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(temp.path());
        seed(&paths);

        let report = clear(&paths, Some("app"), false).expect("clear");
        assert_eq!(report.sessions.len(), 2);
        assert_eq!(report.statuses.len(), 2);
        assert_eq!(report.dirs, vec![paths.project_status_dir("app")]);
        assert!(!paths.project_status_dir("app").exists());
        assert!(paths.project_status_dir("web").exists());
        assert!(
            paths
                .sessions_dir
                .join("programmer-bob-web.json")
                .exists()
        );
    }

    #[test]
    fn project_scope_matches_recorded_project_not_file_suffix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(temp.path());
        seed(&paths);
        let store = SessionStore::new(paths.sessions_dir.clone());
        let other = AgentIdentity::new("my-app", "programmer", "Bob");
        store
            .save(&SessionStore::new_record(&other, "s", 1, None))
            .expect("session");

        let report = clear(&paths, Some("app"), false).expect("clear");
        assert_eq!(report.sessions.len(), 2);
        assert!(store.get(&other).is_some());
    }

    #[test]
    fn clearing_everything_removes_all_project_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(temp.path());
        seed(&paths);

        let report = clear(&paths, None, false).expect("clear");
        assert_eq!(report.dirs.len(), 2);
        assert!(clear(&paths, None, false).expect("again").is_empty());
    }

    #[test]
    fn empty_home_is_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(&temp.path().join("missing"));
        assert!(clear(&paths, None, false).expect("clear").is_empty());
    }
}
