//! `foundry status`: heartbeat overview for monitors.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::io::paths::FoundryPaths;
use crate::io::status::{StatusRecord, list_statuses};

/// One status file as seen by a monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentView {
    pub path: PathBuf,
    /// Status directory name the file was found in.
    pub project: String,
    pub record: StatusRecord,
    pub stale: bool,
}

impl AgentView {
    pub fn exited(&self) -> bool {
        self.record.is_exited()
    }
}

/// Collect status files for `project`, or for every project when `None`.
pub fn collect(
    paths: &FoundryPaths,
    project: Option<&str>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<AgentView>> {
    let dirs = match project {
        Some(project) => vec![paths.project_status_dir(project)],
        None => project_dirs(&paths.status_root)?,
    };
    let mut views = Vec::new();
    for dir in dirs {
        let project = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for (path, record) in list_statuses(&dir)? {
            let stale = record.age(now) > threshold;
            views.push(AgentView {
                path,
                project: project.clone(),
                record,
                stale,
            });
        }
    }
    Ok(views)
}

fn project_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read {}", root.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", root.display()))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// One line per agent: who, status, details, heartbeat age and flags.
pub fn format_view(view: &AgentView, now: DateTime<Utc>) -> String {
    let record = &view.record;
    let who = match (&record.agent_type, &record.name) {
        (Some(agent_type), Some(name)) if name != agent_type => format!("{agent_type} ({name})"),
        (Some(agent_type), _) => agent_type.clone(),
        _ => view
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let mut line = format!(
        "{}/{who}: {} - {} [updated {}s ago, pid {}]",
        view.project,
        record.status,
        record.details,
        record.age(now).as_secs(),
        record.pid
    );
    if view.exited() {
        line.push_str(" (exited)");
    } else if view.stale {
        line.push_str(" (stale)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::AgentIdentity;
    use crate::io::status::{StatusReporter, statuses};

    fn reporter(paths: &FoundryPaths, project: &str, agent_type: &str, name: &str) -> StatusReporter {
        let identity = AgentIdentity::new(project, agent_type, name);
        StatusReporter::new(paths.status_path(&identity), identity)
    }

    #[test]
    fn collects_one_project_or_all() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(temp.path());
        reporter(&paths, "app", "manager", "Alice Chen")
            .update(statuses::RUNNING, "Project state: MONITORING")
            .expect("manager");
        reporter(&paths, "app", "programmer", "Bob")
            .update(statuses::EXITED_SUCCESS, "Completed successfully")
            .expect("programmer");
        reporter(&paths, "other", "manager", "manager")
            .update(statuses::IDLE, "Waiting 30s before next poll")
            .expect("other");

        let now = Utc::now();
        let app = collect(&paths, Some("app"), Duration::from_secs(300), now).expect("app");
        assert_eq!(app.len(), 2);
        assert!(app.iter().all(|view| view.project == "app"));

        let all = collect(&paths, None, Duration::from_secs(300), now).expect("all");
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].project, "other");
    }

    #[test]
    fn format_flags_exited_and_stale_agents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(temp.path());
        reporter(&paths, "app", "programmer", "Bob")
            .update(statuses::EXITED_SUCCESS, "Completed successfully")
            .expect("programmer");
        reporter(&paths, "app", "manager", "Alice Chen")
            .update(statuses::RUNNING, "Running iteration 3")
            .expect("manager");

        let later = Utc::now() + chrono::Duration::seconds(600);
        let views = collect(&paths, Some("app"), Duration::from_secs(300), later).expect("views");
        let lines: Vec<String> = views.iter().map(|v| format_view(v, later)).collect();

        assert!(lines[0].starts_with("app/manager (Alice Chen): running - Running iteration 3"));
        assert!(lines[0].ends_with("(stale)"));
        assert!(lines[1].starts_with("app/programmer (Bob): exited:success"));
        assert!(lines[1].ends_with("(exited)"));
    }

    #[test]
    fn missing_status_root_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = FoundryPaths::new(&temp.path().join("nowhere"));
        let views = collect(&paths, None, Duration::from_secs(300), Utc::now()).expect("views");
        assert!(views.is_empty());
    }
}
