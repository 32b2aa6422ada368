//! Prompt templates for the concrete agent roles.

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::debug;

/// Every template the agents render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Classifier,
    ManagerSystem,
    ManagerInitial,
    ManagerAssigning,
    ManagerMonitoring,
    ManagerCompleted,
    ProgrammerSystem,
    ProgrammerRegister,
    ProgrammerWaiting,
    ProgrammerWorking,
}

impl Template {
    const ALL: [Template; 10] = [
        Template::Classifier,
        Template::ManagerSystem,
        Template::ManagerInitial,
        Template::ManagerAssigning,
        Template::ManagerMonitoring,
        Template::ManagerCompleted,
        Template::ProgrammerSystem,
        Template::ProgrammerRegister,
        Template::ProgrammerWaiting,
        Template::ProgrammerWorking,
    ];

    fn name(self) -> &'static str {
        match self {
            Template::Classifier => "classifier",
            Template::ManagerSystem => "manager_system",
            Template::ManagerInitial => "manager_initial",
            Template::ManagerAssigning => "manager_assigning",
            Template::ManagerMonitoring => "manager_monitoring",
            Template::ManagerCompleted => "manager_completed",
            Template::ProgrammerSystem => "programmer_system",
            Template::ProgrammerRegister => "programmer_register",
            Template::ProgrammerWaiting => "programmer_waiting",
            Template::ProgrammerWorking => "programmer_working",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Template::Classifier => include_str!("prompts/classifier.md"),
            Template::ManagerSystem => include_str!("prompts/manager_system.md"),
            Template::ManagerInitial => include_str!("prompts/manager_initial.md"),
            Template::ManagerAssigning => include_str!("prompts/manager_assigning.md"),
            Template::ManagerMonitoring => include_str!("prompts/manager_monitoring.md"),
            Template::ManagerCompleted => include_str!("prompts/manager_completed.md"),
            Template::ProgrammerSystem => include_str!("prompts/programmer_system.md"),
            Template::ProgrammerRegister => include_str!("prompts/programmer_register.md"),
            Template::ProgrammerWaiting => include_str!("prompts/programmer_waiting.md"),
            Template::ProgrammerWorking => include_str!("prompts/programmer_working.md"),
        }
    }
}

/// Template engine wrapper around minijinja.
///
/// Undefined variables are errors, so a prompt never silently renders with a hole.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for template in Template::ALL {
            env.add_template(template.name(), template.source())
                .with_context(|| format!("load {} template", template.name()))?;
        }
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, template: Template, ctx: S) -> Result<String> {
        let rendered = self
            .env
            .get_template(template.name())?
            .render(ctx)
            .with_context(|| format!("render {} prompt", template.name()))?;
        debug!(template = template.name(), bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}
