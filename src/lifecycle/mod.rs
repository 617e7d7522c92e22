//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     host shutting down → trigger → update worker leaves its loop
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
