//! Routine execution.
//!
//! - `engine` -- the step state machine (`run`, `resume`, `cancel`)
//! - `tools` -- `ToolRegistry` and the `Tool` trait
//! - `udf` -- the `UdfModule` port
//! - `store` -- the `StateStore` port for suspended runs
//! - `source` -- `RoutineHandle` and the `RoutineSource` port
//! - `recovery` -- the `RecoveryHook` port
//! - `answers` -- prompt answer validation
//! - `replay` -- fixture-backed tools and UDFs

pub mod answers;
pub mod engine;
pub mod recovery;
pub mod replay;
pub mod source;
pub mod store;
pub mod tools;
pub mod udf;

pub use engine::{Engine, EngineConfig, EngineError};
pub use recovery::{BoxRecoveryHook, RecoveryAction, RecoveryHook, RecoveryRequest};
pub use source::{RoutineHandle, RoutineSource};
pub use store::{InMemoryStateStore, StateStore};
pub use tools::{Tool, ToolError, ToolRegistry};
pub use udf::{UdfError, UdfModule};
