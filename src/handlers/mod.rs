//! Route handlers for the two services.
//!
//! Handlers receive the request's server span context as an
//! `Extension<opentelemetry::Context>` inserted by the observability
//! middleware and pass it explicitly to anything that logs, traces or calls
//! out.

pub mod backend;
pub mod frontend;

pub use backend::BackendState;
