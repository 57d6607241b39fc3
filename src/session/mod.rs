//! Backend session subsystem.
//!
//! # Data Flow
//! ```text
//! login(username)
//!     → registry.rs (get_or_create, one session per identity)
//!     → backend.rs (session task: connect, send login, await reply)
//!     → connection.rs (TCP dial, line framing)
//!
//! Session States:
//!     Disconnected → Connecting → Active | Errored
//!     Active → Closed | Errored
//! ```

pub mod backend;
pub mod connection;
pub mod registry;

pub use backend::{BackendSession, PendingReply, SessionState, SessionStatus};
pub use connection::ConnectionId;
pub use registry::{SessionRegistry, SessionSnapshot};
