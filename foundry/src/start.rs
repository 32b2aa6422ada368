//! Orchestration for starting (or resuming) one agent process.
//!
//! Starting an agent resolves its identity from the project directory, decides
//! whether to continue the previous engine session, installs the interrupt
//! handler and hands over to [`run_loop`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::agents::AgentBehavior;
use crate::agents::manager::{self, ManagerBehavior};
use crate::agents::programmer::{self, ProgrammerBehavior};
use crate::core::identity::AgentIdentity;
use crate::exit_codes;
use crate::interrupt::{InterruptController, install_handler};
use crate::io::classifier::classifier_from_config;
use crate::io::config::load_config;
use crate::io::console::{HumanInput, TerminalConsole};
use crate::io::engine::ClaudeEngine;
use crate::io::paths::{FoundryPaths, project_name_for};
use crate::io::process::ChildGroups;
use crate::io::render::{ConsoleRenderer, Renderer, Verbosity};
use crate::io::sessions::{SessionStore, format_session};
use crate::io::status::{StatusReporter, StatusUpdate, statuses};
use crate::looping::{AgentRecords, Collaborators, LoopConfig, LoopOutcome, run_loop};

/// How to treat a previously saved session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Ask the operator when a session exists.
    #[default]
    Ask,
    /// Resume; fail if there is nothing to resume.
    Resume,
    /// Discard any saved session.
    New,
}

/// `--resume` was given but no session is saved for this identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNotFoundError {
    pub identity: AgentIdentity,
}

impl fmt::Display for SessionNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No existing session found for {}. Run without --resume to start a new session.",
            self.identity.agent_name
        )
    }
}

impl std::error::Error for SessionNotFoundError {}

/// Built-in agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Manager,
    Programmer,
}

impl AgentRole {
    pub fn agent_type(self) -> &'static str {
        match self {
            AgentRole::Manager => manager::AGENT_TYPE,
            AgentRole::Programmer => programmer::AGENT_TYPE,
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            AgentRole::Manager => manager::DEFAULT_NAME,
            AgentRole::Programmer => programmer::DEFAULT_NAME,
        }
    }
}

/// Options for `foundry manager` / `foundry programmer`.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub role: AgentRole,
    pub name: String,
    pub project_dir: PathBuf,
    pub verbosity: Verbosity,
    /// Overrides `max_iterations` from the config file.
    pub max_iterations: Option<u32>,
    pub session_mode: SessionMode,
}

/// Decide which session the first turn continues.
///
/// Returns the session id to resume, or `None` for a fresh conversation.
pub fn resolve_session<H, R>(
    store: &SessionStore,
    identity: &AgentIdentity,
    mode: SessionMode,
    console: &mut H,
    renderer: &mut R,
) -> Result<Option<String>>
where
    H: HumanInput,
    R: Renderer,
{
    match mode {
        SessionMode::New => {
            if store.delete(identity)? {
                renderer.notice("Deleted existing session.");
            }
            Ok(None)
        }
        SessionMode::Resume => match store.get(identity) {
            Some(record) => {
                info!(session_id = %record.session_id, "resuming session");
                Ok(Some(record.session_id))
            }
            None => Err(SessionNotFoundError {
                identity: identity.clone(),
            }
            .into()),
        },
        SessionMode::Ask => {
            let Some(record) = store.get(identity) else {
                return Ok(None);
            };
            renderer.notice("Found previous session:");
            renderer.notice(&format_session(&record));
            if console.confirm("Continue previous session?")? {
                info!(session_id = %record.session_id, "resuming session");
                Ok(Some(record.session_id))
            } else {
                store.delete(identity)?;
                renderer.notice("Starting new session.");
                Ok(None)
            }
        }
    }
}

/// Second-interrupt cleanup: engine children do not share our process group, so
/// they are killed here before the terminal status is written.
fn hard_stop(children: &ChildGroups, status: &StatusReporter) {
    children.kill_all();
    if let Err(err) = status.update(statuses::EXITED_TERMINATED, "Immediate exit") {
        warn!(err = %format!("{err:#}"), "failed to record immediate exit");
    }
}

/// Run one agent until it completes, is interrupted or hits its iteration limit.
pub fn run_agent(paths: &FoundryPaths, options: &AgentOptions) -> Result<LoopOutcome> {
    let config = load_config(&paths.config_path)
        .with_context(|| format!("load config {}", paths.config_path.display()))?;
    let identity = AgentIdentity::new(
        project_name_for(&options.project_dir),
        options.role.agent_type(),
        options.name.as_str(),
    );
    info!(agent = %identity, project_dir = %options.project_dir.display(), "starting agent");

    let sessions = SessionStore::new(paths.sessions_dir.clone());
    let mut console = TerminalConsole::stdin();
    let mut renderer = ConsoleRenderer::stdout(options.verbosity);
    let resume = resolve_session(
        &sessions,
        &identity,
        options.session_mode,
        &mut console,
        &mut renderer,
    )?;

    let status = StatusReporter::new(paths.status_path(&identity), identity.clone());
    status.update_with(
        StatusUpdate::new(statuses::STARTING, "Initializing agent")
            .field("project_dir", options.project_dir.display().to_string()),
    )?;

    let interrupt = Arc::new(InterruptController::new());
    let children = ChildGroups::new();
    let immediate_children = children.clone();
    let immediate_status = status.clone();
    install_handler(Arc::clone(&interrupt), move || {
        hard_stop(&immediate_children, &immediate_status);
        std::process::exit(exit_codes::INTERRUPTED);
    })?;

    let poll_interval = config.poll_interval();
    let mut behavior: Box<dyn AgentBehavior> = match options.role {
        AgentRole::Manager => Box::new(ManagerBehavior::new(
            &options.name,
            &options.project_dir,
            poll_interval,
        )?),
        AgentRole::Programmer => Box::new(ProgrammerBehavior::new(
            &options.name,
            &options.project_dir,
            poll_interval,
        )?),
    };

    let mut io = Collaborators {
        engine: ClaudeEngine::new(config.engine.clone(), children),
        classifier: classifier_from_config(&config.classifier),
        console,
        renderer,
    };
    let records = AgentRecords {
        identity,
        sessions,
        status,
    };
    let loop_config = LoopConfig {
        max_iterations: options.max_iterations.unwrap_or(config.max_iterations),
        workdir: Some(options.project_dir.clone()),
        resume,
    };
    run_loop(behavior.as_mut(), &mut io, &records, &interrupt, &loop_config)
}
