//! UDF module implementations.
//!
//! - `script` -- compiles a package's `udf.rhai` and calls its functions

pub mod script;

pub use script::RhaiUdfModule;
