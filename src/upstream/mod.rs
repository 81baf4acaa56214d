//! Outbound calls to other services.
//!
//! [`instrument::instrument_call`] wraps a single round trip with a client
//! span, metrics and logs; [`client::UpstreamClient`] performs that round
//! trip over HTTP and propagates the trace context.

pub mod client;
pub mod instrument;

pub use client::{ClientBuildError, UpstreamClient};
pub use instrument::{
    instrument_call, RawResponse, UpstreamCall, UpstreamError, UpstreamResponse,
};
