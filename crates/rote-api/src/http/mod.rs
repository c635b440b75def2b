//! HTTP/REST API layer for Rote.
//!
//! Axum routes at `/api/v1/` that call compile, run, resume, cancel and
//! validate, wrapped in the `{data, meta, errors}` envelope.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
