//! HTTP layer shared by both services.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum serve, layer stack)
//!     → middleware.rs (server span, start/complete logs, request metrics)
//!     → service handlers
//!     → response.rs (ApiError / panic → {"detail": ...})
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, HandlerFault};
pub use server::{metrics_handler, with_observability, HttpServer};
