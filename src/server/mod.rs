//! The static file server.
//!
//! Requests are routed by [`Dispatcher`]: proxy rules first, then the
//! filesystem under the document root.

mod response;
mod config;
mod error;
mod dispatcher;
mod files;
mod listing;
mod mime;
mod proxy;
mod port;
mod tls;
mod http_server;

// Re-export public items
pub use response::{HttpResponse, StatusCode};
pub use config::{Autoindex, Options, ServerConfig, TlsSettings};
pub use error::Error;
pub use dispatcher::{Dispatcher, Outcome, RequestContext, resolve_path};
pub use files::default_error_page;
pub use listing::{DirectoryEntry, render_listing, sort_entries};
pub use mime::{ContentTypeRegistry, FALLBACK_CONTENT_TYPE};
pub use proxy::{ProxyRule, ProxyTarget, find_rule};
pub use port::{use_port, use_port_on};
pub use tls::load_acceptor;
pub use http_server::{HttpServer, Transport};
