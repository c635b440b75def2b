//! Compiler, expression evaluator and runtime engine for Rote.
//!
//! This crate defines the "ports" (capability traits such as `StateStore`,
//! `UdfModule`, `RecoveryHook` and `LlmClient`) that the infrastructure layer
//! implements. It depends only on `rote-types` -- never on `rote-infra` or
//! any database/IO crate.

pub mod compiler;
pub mod expr;
pub mod llm;
pub mod runtime;
pub mod validate;
