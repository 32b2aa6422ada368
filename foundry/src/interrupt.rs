//! Two-stage Ctrl+C handling shared between the signal handler and the agent loop.
//!
//! The first interrupt asks for a graceful stop. If no engine turn is running the
//! stop takes effect at once: any interruptible wait (idle sleep, console read)
//! wakes up and the loop finalizes its status. If a turn is running, the request
//! is recorded and the turn finishes first. A second interrupt always requests
//! an immediate exit.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// What the caller of [`InterruptController::signal`] must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Nothing was running; the loop stops at once.
    StopNow,
    /// A turn is in flight; the loop stops when it completes.
    Deferred,
    /// Second interrupt: terminate the process without further cleanup.
    Immediate,
}

/// Outcome of an interruptible wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Elapsed,
    Interrupted,
}

#[derive(Debug, Default)]
struct InterruptState {
    shutdown_requested: bool,
    turn_in_flight: bool,
}

/// Shared shutdown flags plus a condition variable that wakes interruptible waits.
#[derive(Debug, Default)]
pub struct InterruptController {
    state: Mutex<InterruptState>,
    wake: Condvar,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InterruptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one interrupt and report how the process should react.
    pub fn signal(&self) -> SignalAction {
        let mut state = self.lock();
        if state.shutdown_requested {
            return SignalAction::Immediate;
        }
        state.shutdown_requested = true;
        let action = if state.turn_in_flight {
            SignalAction::Deferred
        } else {
            SignalAction::StopNow
        };
        drop(state);
        self.wake.notify_all();
        action
    }

    pub fn shutdown_requested(&self) -> bool {
        self.lock().shutdown_requested
    }

    pub fn turn_in_flight(&self) -> bool {
        self.lock().turn_in_flight
    }

    /// Mark an engine turn as running until the returned guard is dropped.
    pub fn begin_turn(&self) -> TurnGuard<'_> {
        self.lock().turn_in_flight = true;
        TurnGuard { controller: self }
    }

    /// Sleep for `duration`, returning early if a shutdown is requested.
    pub fn sleep(&self, duration: Duration) -> Wait {
        let deadline = Instant::now() + duration;
        let mut state = self.lock();
        loop {
            if state.shutdown_requested {
                return Wait::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                return Wait::Elapsed;
            }
            let (next, _) = self
                .wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }
}

/// Clears the in-flight flag when a turn ends, including on error paths.
#[derive(Debug)]
pub struct TurnGuard<'a> {
    controller: &'a InterruptController,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.controller.lock().turn_in_flight = false;
    }
}

/// Route SIGINT/SIGTERM into `controller`.
///
/// `on_immediate` runs on the second interrupt and should exit the process.
pub fn install_handler<F>(controller: Arc<InterruptController>, on_immediate: F) -> Result<()>
where
    F: Fn() + Send + 'static,
{
    ctrlc::set_handler(move || match controller.signal() {
        SignalAction::StopNow => {
            info!("shutdown requested");
            eprintln!("\nShutting down...");
        }
        SignalAction::Deferred => {
            info!("shutdown requested while a turn is running");
            eprintln!("\nShutdown requested. Waiting for the current turn to complete...");
            eprintln!("Press Ctrl+C again to exit immediately.");
        }
        SignalAction::Immediate => {
            warn!("immediate shutdown requested");
            eprintln!("\nImmediate shutdown requested.");
            on_immediate();
        }
    })
    .context("install interrupt handler")
}
