//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectTo (address, port, TLS, multi)
//!     → listener.rs (bind, connection limits)
//!     → manager.rs (accept loop per listener, task per connection)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (ids, active count)
//!     → hyper http1 connection → Dispatcher
//! ```
//!
//! # Design Decisions
//! - All bindings succeed or none stay open
//! - Bounded connection slots per listener
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod manager;
pub mod tls;

pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{ConnectTo, Listener, ListenerError};
pub use manager::ConnectionManager;
pub use tls::SecurityContext;
