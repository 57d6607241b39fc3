//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request (JSON)
//!     → server.rs (Axum router, middleware)
//!     → request.rs (request ID, tracing span)
//!     → handlers.rs (extract body/path, call the dispatcher)
//!     → response.rs (JSON envelope, status mapping)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, ApiResponse};
pub use server::{AppState, HttpServer};
