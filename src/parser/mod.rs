//! HTTP request-head parsing.
//!
//! The server only needs the request line and the header block to make a
//! routing decision; bodies are never parsed, only relayed.

mod request;
mod method;
mod version;
mod error;

// Re-export public items
pub use request::{HttpRequest, find_head_end};
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;

// Re-export the parse_request function
pub use request::parse_request;
