//! REST API handler modules.

pub mod compile;
pub mod runs;
pub mod validate;
