//! HTTP route handlers grouped by resource.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive an OpenAPI
//! document automatically.

pub mod health;
pub mod runs;
