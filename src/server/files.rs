//! Static file and error responses.

use std::io::ErrorKind;
use std::path::Path;

use log::warn;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::server::error::Error;
use crate::server::mime::ContentTypeRegistry;
use crate::server::response::{HttpResponse, StatusCode};

const DEFAULT_ERROR_PAGE: &str = include_str!("assets/404.html");

const FORBIDDEN_MESSAGE: &str = "403 Forbidden: the server understood the request but refuses to serve it";

/// The bundled 404 page, stamped with the package name and version.
pub fn default_error_page() -> String {
    DEFAULT_ERROR_PAGE
        .replace("__NAME__", env!("CARGO_PKG_NAME"))
        .replace("__VERSION__", env!("CARGO_PKG_VERSION"))
}

/// Write the response head for `path` and stream the already opened file as the body.
///
/// The copy goes through a fixed-size buffer, so a slow reader on the other
/// end holds back further disk reads. A failure after the head has been
/// written can only be reported by dropping the connection.
pub async fn stream_file<W>(
    socket: &mut W,
    registry: &ContentTypeRegistry,
    path: &Path,
    mut file: File,
    status: StatusCode,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = file.metadata().await?.len();
    let head = HttpResponse::new(status)
        .with_content_type(registry.for_path(path))
        .with_header("Content-Length", len.to_string());

    socket.write_all(&head.head_bytes()).await?;
    tokio::io::copy(&mut file, socket).await?;
    socket.flush().await?;
    Ok(())
}

/// Serve a file, or the matching error response if it cannot be opened.
pub async fn send_file<W>(
    socket: &mut W,
    registry: &ContentTypeRegistry,
    error_page: Option<&Path>,
    path: &Path,
) -> Result<StatusCode, Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match File::open(path).await {
        Ok(file) => {
            stream_file(socket, registry, path, file, StatusCode::Ok).await?;
            Ok(StatusCode::Ok)
        }
        Err(e) => send_error(socket, registry, error_page, &e).await,
    }
}

/// Map a filesystem error to its HTTP response.
///
/// Not-found goes to the 404 page, permission errors get a plain 403, and
/// anything else is a 500.
pub async fn send_error<W>(
    socket: &mut W,
    registry: &ContentTypeRegistry,
    error_page: Option<&Path>,
    err: &std::io::Error,
) -> Result<StatusCode, Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => {
            send_not_found(socket, registry, error_page).await?;
            Ok(StatusCode::NotFound)
        }
        ErrorKind::PermissionDenied => {
            HttpResponse::new(StatusCode::Forbidden)
                .with_content_type("text/plain; charset=utf-8")
                .with_body_string(FORBIDDEN_MESSAGE)
                .write_to(socket)
                .await?;
            Ok(StatusCode::Forbidden)
        }
        _ => {
            warn!("Unhandled filesystem error: {err}");
            HttpResponse::new(StatusCode::InternalServerError)
                .with_content_type("text/plain; charset=utf-8")
                .with_body_string(format!("500 Internal Server Error: {err}"))
                .write_to(socket)
                .await?;
            Ok(StatusCode::InternalServerError)
        }
    }
}

/// Respond 404 with the custom error page if one is configured and readable,
/// otherwise with the bundled page.
pub async fn send_not_found<W>(
    socket: &mut W,
    registry: &ContentTypeRegistry,
    error_page: Option<&Path>,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Some(page) = error_page {
        match File::open(page).await {
            Ok(file) => return stream_file(socket, registry, page, file, StatusCode::NotFound).await,
            Err(e) => warn!("Cannot open error page {}: {e}", page.display()),
        }
    }

    HttpResponse::new(StatusCode::NotFound)
        .with_content_type("text/html; charset=utf-8")
        .with_body_string(default_error_page())
        .write_to(socket)
        .await?;
    Ok(())
}
