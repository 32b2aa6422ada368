//! The turn loop shared by every agent role.
//!
//! Each iteration submits one prompt to the engine, streams the events to the
//! renderer, records the session and decides what comes next: a human answer,
//! a continuation prompt after an optional idle wait, or a stop. Every way out
//! of the loop leaves a terminal status behind.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::agents::AgentBehavior;
use crate::core::classifier::InputClassifier;
use crate::core::identity::AgentIdentity;
use crate::interrupt::{InterruptController, Wait};
use crate::io::console::{HumanInput, InputRead};
use crate::io::engine::{Engine, EngineEvent, TurnRequest, TurnResult};
use crate::io::render::Renderer;
use crate::io::sessions::SessionStore;
use crate::io::status::{StatusReporter, StatusUpdate, statuses};

pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

const SHUTDOWN_DETAILS: &str = "User requested shutdown";
const COMPLETED_DETAILS: &str = "Completed successfully";

/// Reason why `run_loop` stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The behavior reported completion.
    Completed,
    /// A graceful shutdown was requested.
    Interrupted,
    /// The iteration limit was reached first.
    MaxIterations { max_iterations: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Turns submitted to the engine.
    pub iterations: u32,
    /// Session to resume next time, if any turn ran.
    pub session_id: Option<String>,
    pub stop: LoopStop,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    /// Working directory for engine turns.
    pub workdir: Option<PathBuf>,
    /// Session to continue on the first turn.
    pub resume: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            workdir: None,
            resume: None,
        }
    }
}

/// External collaborators the loop talks to.
pub struct Collaborators<E, C, H, R> {
    pub engine: E,
    pub classifier: C,
    pub console: H,
    pub renderer: R,
}

/// Where an agent persists its session and heartbeat.
#[derive(Debug, Clone)]
pub struct AgentRecords {
    pub identity: AgentIdentity,
    pub sessions: SessionStore,
    pub status: StatusReporter,
}

struct Turn {
    last_text: String,
    result: TurnResult,
}

/// Run turns until the behavior completes, a shutdown is requested or the
/// iteration limit is reached.
///
/// Any error is recorded as `exited:error` before it is returned.
#[instrument(skip_all, fields(agent = %records.identity, max_iterations = config.max_iterations))]
pub fn run_loop<E, C, H, R>(
    behavior: &mut dyn AgentBehavior,
    io: &mut Collaborators<E, C, H, R>,
    records: &AgentRecords,
    interrupt: &InterruptController,
    config: &LoopConfig,
) -> Result<LoopOutcome>
where
    E: Engine,
    C: InputClassifier,
    H: HumanInput,
    R: Renderer,
{
    match drive(behavior, io, records, interrupt, config) {
        Ok(outcome) => {
            info!(iterations = outcome.iterations, stop = ?outcome.stop, "loop finished");
            Ok(outcome)
        }
        Err(err) => {
            let details = format!("Error: {err:#}");
            if let Err(status_err) = records.status.update(statuses::EXITED_ERROR, &details) {
                warn!(err = %format!("{status_err:#}"), "failed to record error status");
            }
            Err(err)
        }
    }
}

fn drive<E, C, H, R>(
    behavior: &mut dyn AgentBehavior,
    io: &mut Collaborators<E, C, H, R>,
    records: &AgentRecords,
    interrupt: &InterruptController,
    config: &LoopConfig,
) -> Result<LoopOutcome>
where
    E: Engine,
    C: InputClassifier,
    H: HumanInput,
    R: Renderer,
{
    let system_prompt = behavior.system_prompt()?;
    let mut session_id = config.resume.clone();
    let mut prompt = behavior.initial_prompt()?;
    let mut iterations = 0u32;

    loop {
        if interrupt.shutdown_requested() {
            return stop(records, iterations, session_id, LoopStop::Interrupted);
        }
        if iterations >= config.max_iterations {
            let stop_reason = LoopStop::MaxIterations {
                max_iterations: config.max_iterations,
            };
            return stop(records, iterations, session_id, stop_reason);
        }

        iterations += 1;
        records.status.update_with(
            StatusUpdate::new(statuses::RUNNING, format!("Running iteration {iterations}"))
                .field("iteration", iterations),
        )?;

        let request = TurnRequest {
            prompt,
            system_prompt: system_prompt.clone(),
            resume: session_id.clone(),
            workdir: config.workdir.clone(),
        };
        let turn = run_turn(behavior, io, interrupt, &request)?;
        let result = &turn.result;
        session_id = Some(result.session_id.clone());
        records.sessions.save(&SessionStore::new_record(
            &records.identity,
            &result.session_id,
            result.num_turns,
            result.total_cost_usd,
        ))?;

        behavior.on_result(result, &records.status)?;
        if behavior.is_complete(result)? {
            return stop(records, iterations, session_id, LoopStop::Completed);
        }
        if interrupt.shutdown_requested() {
            return stop(records, iterations, session_id, LoopStop::Interrupted);
        }
        if iterations >= config.max_iterations {
            let stop_reason = LoopStop::MaxIterations {
                max_iterations: config.max_iterations,
            };
            return stop(records, iterations, session_id, stop_reason);
        }

        let text = if turn.last_text.trim().is_empty() {
            result.result_text()
        } else {
            turn.last_text.as_str()
        };
        prompt = match next_prompt(behavior, io, records, interrupt, text)? {
            Some(prompt) => prompt,
            None => return stop(records, iterations, session_id, LoopStop::Interrupted),
        };
    }
}

/// Submit one request and drain its events. The turn counts as in flight until
/// the stream is exhausted.
fn run_turn<E, C, H, R>(
    behavior: &mut dyn AgentBehavior,
    io: &mut Collaborators<E, C, H, R>,
    interrupt: &InterruptController,
    request: &TurnRequest,
) -> Result<Turn>
where
    E: Engine,
    R: Renderer,
{
    let _in_flight = interrupt.begin_turn();
    let mut last_text = String::new();
    let mut result = None;
    for event in io.engine.submit(request)? {
        let event = event?;
        io.renderer.render(&event);
        match &event {
            EngineEvent::Assistant(assistant) => {
                let text = assistant.message.text();
                if !text.trim().is_empty() {
                    behavior.on_assistant_text(&text);
                    last_text = text;
                }
            }
            EngineEvent::Result(turn_result) => result = Some(turn_result.clone()),
            _ => {}
        }
    }
    let result = result.ok_or_else(|| anyhow!("engine turn ended without a result event"))?;
    debug!(session_id = %result.session_id, num_turns = result.num_turns, "turn finished");
    Ok(Turn { last_text, result })
}

/// Prompt for the next turn, or `None` when a shutdown interrupted the wait.
fn next_prompt<E, C, H, R>(
    behavior: &mut dyn AgentBehavior,
    io: &mut Collaborators<E, C, H, R>,
    records: &AgentRecords,
    interrupt: &InterruptController,
    text: &str,
) -> Result<Option<String>>
where
    C: InputClassifier,
    H: HumanInput,
    R: Renderer,
{
    if io.classifier.needs_input(text) {
        records
            .status
            .update(statuses::WAITING_INPUT, "Waiting for human input")?;
        io.renderer.notice("Waiting for your input...");
        loop {
            match io.console.read_message(interrupt)? {
                InputRead::Interrupted => return Ok(None),
                InputRead::Message(message) if message.trim().is_empty() => {
                    io.renderer
                        .notice("Input required. Please provide a response.");
                }
                InputRead::Message(message) => return Ok(Some(message)),
            }
        }
    }

    if let Some(interval) = behavior.idle_interval()?.filter(|d| !d.is_zero()) {
        let secs = interval.as_secs();
        records
            .status
            .update(statuses::IDLE, &format!("Waiting {secs}s before next poll"))?;
        io.renderer
            .notice(&format!("Waiting {secs}s before continuing..."));
        if interrupt.sleep(interval) == Wait::Interrupted {
            return Ok(None);
        }
    }
    behavior.continuation_prompt().map(Some)
}

/// Write the terminal status for `reason` and build the outcome.
fn stop(
    records: &AgentRecords,
    iterations: u32,
    session_id: Option<String>,
    reason: LoopStop,
) -> Result<LoopOutcome> {
    let (status, details) = match &reason {
        LoopStop::Completed => (statuses::EXITED_SUCCESS, COMPLETED_DETAILS.to_string()),
        LoopStop::Interrupted => (statuses::EXITED_TERMINATED, SHUTDOWN_DETAILS.to_string()),
        LoopStop::MaxIterations { max_iterations } => (
            statuses::EXITED_TERMINATED,
            format!("Reached max iterations: {max_iterations}"),
        ),
    };
    records.status.update(status, &details)?;
    Ok(LoopOutcome {
        iterations,
        session_id,
        stop: reason,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::core::classifier::QuestionHeuristic;
    use crate::interrupt::SignalAction;
    use crate::io::engine::EventStream;
    use crate::test_support::{
        FixedClassifier, RecordingRenderer, ScriptedBehavior, ScriptedConsole, ScriptedEngine,
        ScriptedTurn, assistant_text, turn_result,
    };

    struct Harness {
        _temp: tempfile::TempDir,
        records: AgentRecords,
    }

    fn harness() -> Harness {
        let temp = tempfile::tempdir().expect("tempdir");
        let identity = AgentIdentity::new("app", "programmer", "Bob");
        let records = AgentRecords {
            sessions: SessionStore::new(temp.path().join("sessions")),
            status: StatusReporter::new(temp.path().join("agents/app/bob.status"), identity.clone()),
            identity,
        };
        Harness {
            _temp: temp,
            records,
        }
    }

    fn collaborators(
        turns: Vec<ScriptedTurn>,
        classifier: FixedClassifier,
        console: ScriptedConsole,
    ) -> Collaborators<ScriptedEngine, FixedClassifier, ScriptedConsole, RecordingRenderer> {
        Collaborators {
            engine: ScriptedEngine::new(turns),
            classifier,
            console,
            renderer: RecordingRenderer::default(),
        }
    }

    fn config(max_iterations: u32) -> LoopConfig {
        LoopConfig {
            max_iterations,
            ..LoopConfig::default()
        }
    }

    fn status_of(harness: &Harness) -> (String, String) {
        let record = harness.records.status.read().expect("status record");
        (record.status, record.details)
    }

    #[test]
    fn single_iteration_limit_terminates_after_one_turn() {
        let harness = harness();
        let mut io = collaborators(
            vec![ScriptedTurn::reply("s1", "Working on it.")],
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );
        let mut behavior = ScriptedBehavior::never_completes();

        let outcome = run_loop(
            &mut behavior,
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(1),
        )
        .expect("loop");

        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.stop, LoopStop::MaxIterations { max_iterations: 1 });
        assert_eq!(io.engine.requests().len(), 1);
        assert_eq!(
            status_of(&harness),
            (
                "exited:terminated".to_string(),
                "Reached max iterations: 1".to_string()
            )
        );
        let session = harness
            .records
            .sessions
            .get(&harness.records.identity)
            .expect("session saved");
        assert_eq!(session.session_id, "s1");
    }

    #[test]
    fn zero_iteration_limit_submits_nothing() {
        let harness = harness();
        let mut io = collaborators(
            vec![ScriptedTurn::reply("s1", "Working on it.")],
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );

        let outcome = run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(0),
        )
        .expect("loop");

        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.stop, LoopStop::MaxIterations { max_iterations: 0 });
        assert!(io.engine.requests().is_empty());
        assert_eq!(status_of(&harness).0, "exited:terminated");
    }

    #[test]
    fn completion_resumes_session_and_records_success() {
        let harness = harness();
        let mut io = collaborators(
            vec![
                ScriptedTurn::reply("s1", "Registered."),
                ScriptedTurn::reply("s1", "Done."),
            ],
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );
        let mut behavior = ScriptedBehavior::completes_after(2);

        let outcome = run_loop(
            &mut behavior,
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(10),
        )
        .expect("loop");

        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.session_id.as_deref(), Some("s1"));
        let requests = io.engine.requests();
        assert_eq!(requests[0].prompt, "start");
        assert_eq!(requests[0].resume, None);
        assert_eq!(requests[1].prompt, "continue 1");
        assert_eq!(requests[1].resume.as_deref(), Some("s1"));
        assert_eq!(requests[1].system_prompt, "You are a test agent.");
        assert_eq!(behavior.assistant_texts, vec!["Registered.", "Done."]);
        assert_eq!(
            status_of(&harness),
            (
                "exited:success".to_string(),
                "Completed successfully".to_string()
            )
        );
    }

    #[test]
    fn first_turn_resumes_configured_session() {
        let harness = harness();
        let mut io = collaborators(
            vec![ScriptedTurn::reply("s2", "ok")],
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );
        let loop_config = LoopConfig {
            max_iterations: 1,
            resume: Some("s1".to_string()),
            ..LoopConfig::default()
        };

        run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &loop_config,
        )
        .expect("loop");

        assert_eq!(io.engine.requests()[0].resume.as_deref(), Some("s1"));
    }

    #[test]
    fn question_waits_for_non_empty_human_answer() {
        let harness = harness();
        let mut io = collaborators(
            vec![
                ScriptedTurn::reply("s1", "Which database should I use?"),
                ScriptedTurn::reply("s1", "Using Postgres."),
            ],
            FixedClassifier::sequence(&[true]),
            ScriptedConsole::new(&["", "Postgres"], &[]),
        );

        run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(2),
        )
        .expect("loop");

        assert_eq!(io.engine.prompts(), vec!["start", "Postgres"]);
        assert_eq!(io.console.reads, 2);
        assert_eq!(
            io.renderer.notices,
            vec![
                "Waiting for your input...",
                "Input required. Please provide a response."
            ]
        );
    }

    #[test]
    fn closed_console_is_recorded_as_error() {
        let harness = harness();
        let mut io = collaborators(
            vec![ScriptedTurn::reply("s1", "Shall I proceed?")],
            FixedClassifier::always(true),
            ScriptedConsole::default(),
        );

        let err = run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(5),
        )
        .unwrap_err();

        assert!(err.to_string().contains("console input closed"));
        let (status, details) = status_of(&harness);
        assert_eq!(status, "exited:error");
        assert!(details.starts_with("Error: console input closed"));
    }

    #[test]
    fn engine_failure_is_recorded_then_propagated() {
        let harness = harness();
        let mut io = collaborators(
            vec![ScriptedTurn::Fail("engine crashed".to_string())],
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );

        let err = run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(5),
        )
        .unwrap_err();

        assert_eq!(err.to_string(), "engine crashed");
        assert_eq!(
            status_of(&harness),
            ("exited:error".to_string(), "Error: engine crashed".to_string())
        );
    }

    #[test]
    fn turn_without_result_event_is_an_error() {
        let harness = harness();
        let mut io = collaborators(
            vec![ScriptedTurn::Events(vec![assistant_text("partial")])],
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );

        let err = run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(5),
        )
        .unwrap_err();

        assert!(err.to_string().contains("without a result event"));
        assert!(harness.records.sessions.get(&harness.records.identity).is_none());
    }

    #[test]
    fn pending_shutdown_stops_before_any_turn() {
        let harness = harness();
        let mut io = collaborators(
            Vec::new(),
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );
        let interrupt = InterruptController::new();
        assert_eq!(interrupt.signal(), SignalAction::StopNow);

        let outcome = run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &interrupt,
            &config(5),
        )
        .expect("loop");

        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.stop, LoopStop::Interrupted);
        assert!(io.engine.requests().is_empty());
        assert_eq!(
            status_of(&harness),
            (
                "exited:terminated".to_string(),
                "User requested shutdown".to_string()
            )
        );
    }

    /// Signals the controller from inside a turn, like a Ctrl+C mid-stream.
    struct InterruptingEngine {
        inner: ScriptedEngine,
        interrupt: Arc<InterruptController>,
        observed: std::cell::Cell<Option<SignalAction>>,
    }

    impl Engine for InterruptingEngine {
        fn submit(&self, request: &TurnRequest) -> Result<EventStream<'_>> {
            self.observed.set(Some(self.interrupt.signal()));
            self.inner.submit(request)
        }
    }

    #[test]
    fn shutdown_during_turn_lets_the_turn_finish() {
        let harness = harness();
        let interrupt = Arc::new(InterruptController::new());
        let mut io = Collaborators {
            engine: InterruptingEngine {
                inner: ScriptedEngine::new(vec![ScriptedTurn::reply("s1", "Halfway.")]),
                interrupt: Arc::clone(&interrupt),
                observed: std::cell::Cell::new(None),
            },
            classifier: FixedClassifier::always(false),
            console: ScriptedConsole::default(),
            renderer: RecordingRenderer::default(),
        };

        let outcome = run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &interrupt,
            &config(5),
        )
        .expect("loop");

        assert_eq!(io.engine.observed.get(), Some(SignalAction::Deferred));
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.stop, LoopStop::Interrupted);
        assert_eq!(io.renderer.events.len(), 2);
        assert!(harness.records.sessions.get(&harness.records.identity).is_some());
        assert!(!interrupt.turn_in_flight());
    }

    #[test]
    fn idle_interval_is_announced_before_continuing() {
        let harness = harness();
        let mut io = collaborators(
            vec![
                ScriptedTurn::reply("s1", "Nothing to do yet."),
                ScriptedTurn::reply("s1", "Still waiting."),
            ],
            FixedClassifier::always(false),
            ScriptedConsole::default(),
        );
        let mut behavior = ScriptedBehavior {
            idle: Some(Duration::from_millis(10)),
            ..ScriptedBehavior::never_completes()
        };

        run_loop(
            &mut behavior,
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(2),
        )
        .expect("loop");

        assert_eq!(io.renderer.notices, vec!["Waiting 0s before continuing..."]);
        assert_eq!(io.engine.prompts(), vec!["start", "continue 1"]);
    }

    #[test]
    fn result_text_is_classified_when_assistant_said_nothing() {
        let harness = harness();
        let mut result = turn_result("s1");
        result.result = Some("Should I deploy now?".to_string());
        let mut io = Collaborators {
            engine: ScriptedEngine::new(vec![
                ScriptedTurn::Events(vec![EngineEvent::Result(result)]),
                ScriptedTurn::reply("s1", "Deployed."),
            ]),
            classifier: QuestionHeuristic,
            console: ScriptedConsole::new(&["yes"], &[]),
            renderer: RecordingRenderer::default(),
        };

        run_loop(
            &mut ScriptedBehavior::never_completes(),
            &mut io,
            &harness.records,
            &InterruptController::new(),
            &config(2),
        )
        .expect("loop");

        assert_eq!(io.engine.prompts(), vec!["start", "yes"]);
    }
}
