//! LLM-assisted capabilities.
//!
//! The deterministic core never needs an LLM. These adapters plug an
//! `LlmClient` into the two optional ports: `HappyPathExtractor` for
//! compilation and `RecoveryHook` for runtime auto-fix.

pub mod client;
pub mod extractor;
pub mod parsing;
pub mod prompts;
pub mod recovery;

pub use client::{BoxLlmClient, LlmClient};
pub use extractor::LlmHappyPathExtractor;
pub use recovery::LlmRecoveryHook;
