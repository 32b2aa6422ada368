//! Resumable autonomous agents that coordinate through shared documents.
//!
//! Each agent process runs a turn loop against a conversational engine and
//! talks to its peers only through files: markdown task and team documents in
//! a planning directory, plus JSON heartbeat files. The architecture enforces
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (field lookup, coordination state
//!   inference, identity naming). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (session and status files, engine and
//!   classifier processes, console). Isolated behind traits to enable scripting
//!   in tests.
//!
//! Orchestration modules ([`looping`], [`start`], [`monitor`], [`clear`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod agents;
pub mod clear;
pub mod core;
pub mod exit_codes;
pub mod interrupt;
pub mod io;
pub mod logging;
pub mod looping;
pub mod monitor;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
