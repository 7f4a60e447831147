//! HTTP response types and utilities.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    MovedPermanently = 301,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// The numeric status code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Represents an HTTP response generated by the server itself.
///
/// File bodies are not held here; the responders write [`HttpResponse::head_bytes`]
/// and then stream the file straight to the connection.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// The HTTP headers, written in insertion order
    pub headers: Vec<(String, String)>,
    /// The response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: vec![
                ("Server".to_string(), "microserve".to_string()),
                ("Connection".to_string(), "close".to_string()),
            ],
            body: Vec::new(),
        }
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body_bytes(body.into().into_bytes())
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        let content_length = self.body.len().to_string();
        self.with_header("Content-Length", content_length)
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Set the content type.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// Get a header value.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The status line and headers, terminated by the blank line.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        let status_line = format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.status.reason_phrase());
        bytes.extend_from_slice(status_line.as_bytes());

        for (name, value) in &self.headers {
            let header_line = format!("{name}: {value}\r\n");
            bytes.extend_from_slice(header_line.as_bytes());
        }

        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    /// Convert the response to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.head_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Write the whole response to a connection.
    pub async fn write_to<W>(&self, socket: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        socket.write_all(&self.to_bytes()).await?;
        socket.flush().await
    }
}
