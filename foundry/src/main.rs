//! Resumable manager/programmer agents coordinating through a planning directory.
//!
//! `foundry manager` and `foundry programmer` run agent loops against the
//! project in `--project-dir`, sharing `<project-dir>-planning/`. Sessions and
//! heartbeats live under the foundry home (`$FOUNDRY_HOME`, default
//! `~/.softfoundry`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use foundry::clear::clear;
use foundry::exit_codes;
use foundry::io::config::{FoundryConfig, load_config, write_config};
use foundry::io::paths::{FoundryPaths, planning_dir_for};
use foundry::io::planning::PlanningDir;
use foundry::io::render::Verbosity;
use foundry::looping::LoopStop;
use foundry::monitor::{collect, format_view};
use foundry::start::{AgentOptions, AgentRole, SessionMode, run_agent};

#[derive(Parser)]
#[command(
    name = "foundry",
    version,
    about = "Resumable autonomous agents coordinating through shared documents"
)]
struct Cli {
    /// Directory for config, sessions and status files.
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the manager agent: plan tasks, assign them and monitor progress.
    Manager(AgentArgs),
    /// Run a programmer agent: register, take assignments and implement them.
    Programmer(AgentArgs),
    /// Show agent heartbeats.
    Status {
        /// Only this project.
        #[arg(long)]
        project: Option<String>,
    },
    /// Show task, team and manager state inferred from the planning directory.
    State {
        #[arg(long)]
        project_dir: PathBuf,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML.
    Config {
        /// Write the defaults to the config file if it does not exist yet.
        #[arg(long)]
        init: bool,
    },
    /// Remove saved sessions and status files.
    Clear {
        /// Only this project.
        #[arg(long)]
        project: Option<String>,
        /// Report what would be removed without removing it.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct AgentArgs {
    /// Project directory; coordination documents live in `<project-dir>-planning`.
    #[arg(long)]
    project_dir: PathBuf,
    /// Agent name (defaults per role).
    #[arg(long)]
    name: Option<String>,
    /// Output detail: minimal, medium or verbose.
    #[arg(long, default_value = "medium")]
    verbosity: Verbosity,
    /// Override `max_iterations` from the config file.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_iterations: Option<u32>,
    /// Resume the saved session; fail if there is none.
    #[arg(long)]
    resume: bool,
    /// Discard any saved session.
    #[arg(long, conflicts_with = "resume")]
    new_session: bool,
}

impl AgentArgs {
    fn into_options(self, role: AgentRole) -> AgentOptions {
        let session_mode = if self.resume {
            SessionMode::Resume
        } else if self.new_session {
            SessionMode::New
        } else {
            SessionMode::Ask
        };
        AgentOptions {
            role,
            name: self
                .name
                .unwrap_or_else(|| role.default_name().to_string()),
            project_dir: self.project_dir,
            verbosity: self.verbosity,
            max_iterations: self.max_iterations,
            session_mode,
        }
    }
}

fn main() {
    foundry::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = FoundryPaths::resolve(cli.home.as_deref())?;
    match cli.command {
        Command::Manager(args) => cmd_agent(&paths, args.into_options(AgentRole::Manager)),
        Command::Programmer(args) => cmd_agent(&paths, args.into_options(AgentRole::Programmer)),
        Command::Status { project } => cmd_status(&paths, project.as_deref()),
        Command::State { project_dir, json } => cmd_state(&project_dir, json),
        Command::Config { init } => cmd_config(&paths, init),
        Command::Clear { project, dry_run } => cmd_clear(&paths, project.as_deref(), dry_run),
    }
}

fn cmd_agent(paths: &FoundryPaths, options: AgentOptions) -> Result<i32> {
    let outcome = run_agent(paths, &options)?;
    match outcome.stop {
        LoopStop::Completed => {
            println!("Agent completed after {} iterations.", outcome.iterations);
        }
        LoopStop::Interrupted => {
            println!("Agent stopped after {} iterations.", outcome.iterations);
        }
        LoopStop::MaxIterations { max_iterations } => {
            println!("Reached max iterations ({max_iterations}).");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_status(paths: &FoundryPaths, project: Option<&str>) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let now = Utc::now();
    let views = collect(paths, project, config.stale_threshold(), now)?;
    if views.is_empty() {
        println!("No agent status files found.");
    }
    for view in &views {
        println!("{}", format_view(view, now));
    }
    Ok(exit_codes::OK)
}

fn cmd_state(project_dir: &std::path::Path, json: bool) -> Result<i32> {
    let planning = PlanningDir::new(planning_dir_for(project_dir));
    let snapshot = planning.snapshot()?;
    if json {
        let payload = serde_json::to_string_pretty(&snapshot).context("serialize state")?;
        println!("{payload}");
        return Ok(exit_codes::OK);
    }
    println!("Planning directory: {}", planning.root().display());
    println!("Manager state: {}", snapshot.manager.as_str());
    println!("Tasks:");
    for task in &snapshot.tasks {
        println!(
            "  {}: {} (assigned to: {})",
            task.file_name,
            task.record.status.as_str(),
            task.record.assignee.as_deref().unwrap_or("nobody")
        );
    }
    println!("Team:");
    for member in &snapshot.members {
        println!(
            "  {}: {} (task: {})",
            member.file_name,
            member.record.status.as_str(),
            member.record.assigned_task.as_deref().unwrap_or("none")
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_config(paths: &FoundryPaths, init: bool) -> Result<i32> {
    if init && !paths.config_path.exists() {
        write_config(&paths.config_path, &FoundryConfig::default())?;
        eprintln!("Wrote {}", paths.config_path.display());
    }
    let config = load_config(&paths.config_path)?;
    let rendered = toml::to_string_pretty(&config).context("serialize config toml")?;
    print!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_clear(paths: &FoundryPaths, project: Option<&str>, dry_run: bool) -> Result<i32> {
    let report = clear(paths, project, dry_run)?;
    if report.is_empty() {
        println!("Nothing to clear.");
        return Ok(exit_codes::OK);
    }
    let verb = if dry_run { "Would remove" } else { "Removed" };
    for path in report.sessions.iter().chain(&report.statuses) {
        println!("{verb} {}", path.display());
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_programmer_defaults() {
        let cli = Cli::parse_from(["foundry", "programmer", "--project-dir", "app"]);
        let Command::Programmer(args) = cli.command else {
            panic!("expected programmer command");
        };
        let options = args.into_options(AgentRole::Programmer);
        assert_eq!(options.name, "John Doe");
        assert_eq!(options.verbosity, Verbosity::Medium);
        assert_eq!(options.session_mode, SessionMode::Ask);
        assert_eq!(options.max_iterations, None);
    }

    #[test]
    fn parse_manager_flags() {
        let cli = Cli::parse_from([
            "foundry",
            "--home",
            "/tmp/h",
            "manager",
            "--project-dir",
            "app",
            "--name",
            "Dana",
            "--verbosity",
            "verbose",
            "--max-iterations",
            "5",
            "--resume",
        ]);
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/h")));
        let Command::Manager(args) = cli.command else {
            panic!("expected manager command");
        };
        let options = args.into_options(AgentRole::Manager);
        assert_eq!(options.name, "Dana");
        assert_eq!(options.verbosity, Verbosity::Verbose);
        assert_eq!(options.max_iterations, Some(5));
        assert_eq!(options.session_mode, SessionMode::Resume);
    }

    #[test]
    fn resume_conflicts_with_new_session() {
        let parsed = Cli::try_parse_from([
            "foundry",
            "manager",
            "--project-dir",
            "app",
            "--resume",
            "--new-session",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_verbosity_is_rejected() {
        let parsed = Cli::try_parse_from([
            "foundry",
            "programmer",
            "--project-dir",
            "app",
            "--verbosity",
            "loud",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_max_iterations_is_rejected() {
        let parsed = Cli::try_parse_from([
            "foundry",
            "programmer",
            "--project-dir",
            "app",
            "--max-iterations",
            "0",
        ]);
        assert!(parsed.is_err());
    }
}
