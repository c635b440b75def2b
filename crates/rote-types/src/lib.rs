//! Shared domain types for Rote.
//!
//! This crate contains the data model shared by the compiler, the runtime
//! engine and the adapters: Trace, Routine, Step, RunState, RunResult and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod routine;
pub mod run;
pub mod trace;
