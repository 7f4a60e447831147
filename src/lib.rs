//! A local static-file HTTP server.
//!
//! `microserve` serves a directory tree over HTTP or HTTPS with optional
//! directory listings, a configurable extension to content-type table and
//! simple path-prefix reverse proxying.
//!
//! # Features
//!
//! - Files streamed from disk with a `Content-Type` looked up by extension
//! - Index files (`index.html`, `index.htm` by default) served for directories
//! - Generated listings for directories without an index file
//! - Requests whose target starts with a configured prefix relayed to an upstream
//! - Optional TLS termination from PEM key and certificate files
//! - Automatic selection of the next free port
//!
//! # Examples
//!
//! ## Serving a directory
//!
//! ```no_run
//! use microserve::{HttpServer, ServerConfig};
//!
//! # async fn run() -> Result<(), microserve::ServerError> {
//! let config = ServerConfig {
//!     root: "public".into(),
//!     ..ServerConfig::default()
//! };
//!
//! let server = HttpServer::new(config)?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Loading options from a file
//!
//! ```no_run
//! use microserve::{Options, ServerConfig, use_port};
//!
//! # async fn run() -> Result<(), microserve::ServerError> {
//! let options = Options::from_file("microserve.json")?;
//! let mut config = ServerConfig::from_options(options)?;
//! config.port = use_port(config.port).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Parsing a request head
//!
//! ```
//! use microserve::parse_request;
//!
//! let request = parse_request(b"GET /docs/?page=2 HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
//! assert_eq!(request.path(), "/docs/");
//! assert_eq!(request.query(), Some("page=2"));
//! ```

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use server::{
    ContentTypeRegistry, Dispatcher, Error as ServerError, HttpResponse, HttpServer, Options,
    ServerConfig, StatusCode, Transport, use_port,
};
