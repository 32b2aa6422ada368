//! Side-effecting helpers: files, child processes and the terminal.

pub mod atomic;
pub mod classifier;
pub mod config;
pub mod console;
pub mod engine;
pub mod paths;
pub mod planning;
pub mod process;
pub mod prompt;
pub mod render;
pub mod sessions;
pub mod status;
