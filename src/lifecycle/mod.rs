//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     close() → trigger → accept loops stop → listeners dropped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls Server::close()
//! ```
//!
//! # Design Decisions
//! - Closing stops accepting; in-flight connections are not awaited
//! - Signal handling lives in the binary, the library never installs handlers

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
