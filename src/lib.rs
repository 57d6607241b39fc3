//! Stateful HTTP → TCP chat bridge library.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod session;
pub mod wire;

pub use config::BridgeConfig;
pub use dispatch::CommandDispatcher;
pub use error::{BridgeError, BridgeResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use session::SessionRegistry;
