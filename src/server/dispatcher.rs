//! Per-request routing.
//!
//! Every request takes exactly one of these paths: relayed to a proxy
//! upstream, redirected to add a trailing slash, answered from a directory,
//! answered with a file, or answered with an error page.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::parser::HttpRequest;
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::files::{send_error, send_file, send_not_found};
use crate::server::listing::send_directory;
use crate::server::mime::ContentTypeRegistry;
use crate::server::proxy::{find_rule, forward};
use crate::server::response::{HttpResponse, StatusCode};

/// How a request was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Relayed to the named upstream URL.
    Proxied(String),
    /// Answered locally with this status.
    Responded(StatusCode),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Proxied(url) => write!(f, "proxied to {url}"),
            Outcome::Responded(status) => write!(f, "{}", status.as_u16()),
        }
    }
}

/// State for one request, dropped once the response is written.
#[derive(Debug)]
pub struct RequestContext {
    pub request: HttpRequest,
    /// Where the request path points under the document root.
    pub file_path: PathBuf,
}

impl RequestContext {
    pub fn new(request: HttpRequest, root: &Path) -> Self {
        let file_path = resolve_path(root, request.path());
        Self { request, file_path }
    }
}

/// Map a request path onto the document root.
///
/// The path is percent-decoded and normalised segment by segment: empty and
/// `.` segments are dropped and `..` removes the previous segment, so the
/// result never leaves `root`.
pub fn resolve_path(root: &Path, request_path: &str) -> PathBuf {
    let decoded = percent_decode_str(request_path).decode_utf8_lossy();
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut path = root.to_path_buf();
    path.extend(segments);
    path
}

/// Routes requests for one server. Cheap to clone; all state is shared and read-only.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<ServerConfig>,
    registry: Arc<ContentTypeRegistry>,
}

impl Dispatcher {
    pub fn new(config: Arc<ServerConfig>, registry: Arc<ContentTypeRegistry>) -> Self {
        Self { config, registry }
    }

    /// Answer one request.
    ///
    /// `buffered` is everything read from the connection so far, starting
    /// with the request head; it is only used when the request is proxied,
    /// to relay whatever part of the body arrived with the head.
    pub async fn dispatch<S>(&self, socket: &mut S, request: HttpRequest, buffered: &[u8]) -> Result<Outcome, Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + ?Sized,
    {
        if let Some(rule) = find_rule(&self.config.proxy, &request.target) {
            let url = rule.target.url_for(&request.target);
            forward(socket, &request, buffered, &rule.target).await?;
            return Ok(Outcome::Proxied(url));
        }

        let ctx = RequestContext::new(request, &self.config.root);
        let status = self.serve_path(socket, &ctx).await?;
        Ok(Outcome::Responded(status))
    }

    async fn serve_path<W>(&self, socket: &mut W, ctx: &RequestContext) -> Result<StatusCode, Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let error_page = self.config.error_page.as_deref();

        let metadata = match fs::metadata(&ctx.file_path).await {
            Ok(metadata) => metadata,
            Err(e) => return send_error(socket, &self.registry, error_page, &e).await,
        };

        let request_path = ctx.request.path();
        if metadata.is_dir() {
            if !request_path.ends_with('/') {
                let location = match ctx.request.query() {
                    Some(query) => format!("{request_path}/?{query}"),
                    None => format!("{request_path}/"),
                };
                HttpResponse::new(StatusCode::MovedPermanently)
                    .with_header("Location", location)
                    .with_body_string("")
                    .write_to(socket)
                    .await?;
                return Ok(StatusCode::MovedPermanently);
            }
            return send_directory(socket, &self.config, &self.registry, &ctx.file_path, request_path).await;
        }

        if metadata.is_file() {
            return send_file(socket, &self.registry, error_page, &ctx.file_path).await;
        }

        // sockets, fifos and devices are never served
        send_not_found(socket, &self.registry, error_page).await?;
        Ok(StatusCode::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_plain_paths_under_root() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_path(root, "/"), PathBuf::from("/srv/www"));
        assert_eq!(resolve_path(root, "/docs/"), PathBuf::from("/srv/www/docs"));
        assert_eq!(resolve_path(root, "/a/b.txt"), PathBuf::from("/srv/www/a/b.txt"));
    }

    #[test]
    fn decodes_percent_escapes() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_path(root, "/my%20file.txt"), PathBuf::from("/srv/www/my file.txt"));
    }

    #[test]
    fn traversal_cannot_leave_root() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_path(root, "/../../etc/passwd"), PathBuf::from("/srv/www/etc/passwd"));
        assert_eq!(resolve_path(root, "/a/../../b"), PathBuf::from("/srv/www/b"));
        assert_eq!(resolve_path(root, "/%2e%2e/%2e%2e/etc/passwd"), PathBuf::from("/srv/www/etc/passwd"));
        assert_eq!(resolve_path(root, "/a/%2F..%2F..%2Fsecret"), PathBuf::from("/srv/www/secret"));
    }

    #[test]
    fn dot_segments_are_dropped() {
        let root = Path::new("root");
        assert_eq!(resolve_path(root, "/./a//./b"), PathBuf::from("root/a/b"));
    }
}
