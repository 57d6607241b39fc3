//! Command dispatch.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → dispatcher.rs (look up the *sender's* session)
//!     → command.rs (fixed kind + field set → WireMessage)
//!     → BackendSession::send (enqueue continuation, write)
//!     → PendingReply (raw backend reply back to the handler)
//! ```

pub mod command;
pub mod dispatcher;

pub use command::Command;
pub use dispatcher::CommandDispatcher;
