//! Deterministic, pure logic shared by the agent loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and values and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod coordination;
pub mod fields;
pub mod identity;
pub mod naming;
