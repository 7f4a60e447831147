//! HTTP request-head parsing and representation.

use std::str::FromStr;

use crate::parser::error::Error;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Represents the head of an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request target exactly as received, including any query string
    pub target: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers, in the order they were received
    pub headers: Vec<(String, String)>,
    /// Number of input bytes taken by the request line and headers,
    /// including the terminating blank line
    pub head_len: usize,
}

impl HttpRequest {
    /// Create a new HTTP request head.
    pub fn new(method: Method, target: String, version: HttpVersion, headers: Vec<(String, String)>) -> Self {
        Self {
            method,
            target,
            version,
            headers,
            head_len: 0,
        }
    }

    /// The path component of the target, without the query string.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// The query string of the target, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Get a header value.
    ///
    /// Header names are compared case-insensitively; the first occurrence wins.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }
}

/// Find the end of the request head in `buf`.
///
/// Returns the offset just past the blank line that terminates the header
/// block, accepting both `\r\n\r\n` and bare `\n\n`.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some(i + 2);
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some(i + 3);
            }
        }
        i += 1;
    }
    None
}

/// Parse an HTTP request head from a byte slice.
///
/// # Arguments
///
/// * `input` - Bytes read from the connection; anything after the head is ignored
///
/// # Returns
///
/// The parsed request head, or an error if the head is invalid or incomplete
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    if input.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::EmptyRequest);
    }

    let head_len = find_head_end(input).ok_or(Error::IncompleteHead)?;

    let head = std::str::from_utf8(&input[..head_len])
        .map_err(|_| Error::MalformedRequestLine("Invalid UTF-8".to_string()))?;

    let mut lines = head.lines();

    let request_line = lines.next().ok_or(Error::EmptyRequest)?;

    // method, target and version, separated by single spaces
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    }

    let method = Method::from_str(parts[0])?;

    let target = parts[1].to_string();
    if !target.starts_with('/') {
        return Err(Error::InvalidTarget(target));
    }

    let version = HttpVersion::from_str(parts[2])?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeaderFormat(line.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidHeaderFormat(line.to_string()));
        }

        headers.push((name.to_string(), value.trim().to_string()));
    }

    let mut request = HttpRequest::new(method, target, version, headers);
    request.head_len = head_len;

    if request.version == HttpVersion::Http11 && !request.has_header("Host") {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    Ok(request)
}
