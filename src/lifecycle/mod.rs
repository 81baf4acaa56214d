//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Parse args → Load config → Validate → Build telemetry → Bind → Serve
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → stop accepting → finish in-flight → drain span queue → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The span export queue is drained only after the server has stopped,
//!   so spans from the last requests are not lost

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run_service, ServiceArgs, StartupError};
