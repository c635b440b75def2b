//! SQLite storage layer.
//!
//! Run state persistence backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod pool;
pub mod run_state;
