//! Infrastructure layer for Rote.
//!
//! Implements the ports defined in `rote-core`: SQLite and file-backed run
//! state stores, routine packages on disk, the Rhai UDF module, built-in
//! fetch tools, and HTTP clients for the LLM providers.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod package;
pub mod sqlite;
pub mod store;
pub mod tools;
pub mod udf;

#[cfg(test)]
pub(crate) mod testing;
