//! Backend wire protocol.
//!
//! # Format
//! ```text
//! type:<kind>|key:value|key:value\n
//! ```
//!
//! # Design Decisions
//! - One message per line; the codec itself never sees the newline
//! - Values are not escaped: a value containing `|` or `:` splits into
//!   extra fields on the backend side (known protocol limitation)
//! - Classification is a field search for `type`, not a strict parse

pub mod codec;

pub use codec::{classify, decode, detail, MessageKind, WireMessage};
