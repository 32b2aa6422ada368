//! Filesystem layout under the foundry home directory.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::identity::AgentIdentity;
use crate::core::naming::sanitize_name;

/// Environment variable that overrides the home directory.
pub const HOME_ENV: &str = "FOUNDRY_HOME";

const HOME_DIR_NAME: &str = ".softfoundry";

/// Resolved locations of config, session and status files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundryPaths {
    pub home: PathBuf,
    pub config_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub status_root: PathBuf,
}

impl FoundryPaths {
    pub fn new(home: &Path) -> Self {
        Self {
            home: home.to_path_buf(),
            config_path: home.join("config.toml"),
            sessions_dir: home.join("sessions"),
            status_root: home.join("agents"),
        }
    }

    /// Resolve the home directory: explicit override, then `$FOUNDRY_HOME`, then `$HOME/.softfoundry`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(home) = explicit {
            return Ok(Self::new(home));
        }
        if let Some(home) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(Path::new(&home)));
        }
        let user_home = env::var_os("HOME")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("cannot locate home directory (set {HOME_ENV} or HOME)"))?;
        Ok(Self::new(&Path::new(&user_home).join(HOME_DIR_NAME)))
    }

    pub fn session_path(&self, identity: &AgentIdentity) -> PathBuf {
        self.sessions_dir.join(identity.session_file_name())
    }

    pub fn status_path(&self, identity: &AgentIdentity) -> PathBuf {
        self.status_root
            .join(identity.project_dir_name())
            .join(identity.status_file_name())
    }

    /// Directory holding every status file of `project`.
    pub fn project_status_dir(&self, project: &str) -> PathBuf {
        self.status_root.join(sanitize_name(project))
    }
}

/// Coordination directory for a project: `<project_dir>-planning`.
pub fn planning_dir_for(project_dir: &Path) -> PathBuf {
    match (project_dir.parent(), project_dir.file_name()) {
        (Some(parent), Some(name)) => {
            let mut name = name.to_os_string();
            name.push("-planning");
            parent.join(name)
        }
        _ => {
            let mut name = project_dir.as_os_str().to_os_string();
            name.push("-planning");
            PathBuf::from(name)
        }
    }
}

/// Project namespace derived from a project directory (its final component).
pub fn project_name_for(project_dir: &Path) -> String {
    project_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| project_dir.to_string_lossy().into_owned())
}
