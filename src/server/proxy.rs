//! Path-prefix reverse proxying.
//!
//! A matching request is relayed to its upstream as a single exchange: the
//! request head goes out exactly as it arrived (no `Host` rewrite, no
//! `X-Forwarded-*`), followed by its body, and the upstream response is copied
//! back unchanged. Bodies are delimited by `Content-Length` or chunked
//! encoding; a response with neither runs until the upstream closes. The
//! client connection is not reused afterwards.

use log::debug;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use url::{Host, Url};

use crate::parser::{HttpRequest, Method, find_head_end};
use crate::server::error::Error;

/// Largest upstream response head that will be relayed.
const MAX_RESPONSE_HEAD: usize = 64 * 1024;

/// Longest chunk-size or trailer line accepted in a chunked body.
const MAX_CHUNK_LINE: u64 = 4096;

/// An upstream origin a prefix forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Host name or IP address, without IPv6 brackets.
    pub host: String,
    pub port: u16,
    origin: String,
}

impl ProxyTarget {
    /// Parse an `http://host[:port]` origin. Any path in the URL is ignored.
    pub fn parse(target: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidProxyTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only http:// upstreams are supported"));
        }

        let host = match url.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => return Err(invalid("missing host")),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;
        let origin = match url.host() {
            Some(Host::Ipv6(_)) => format!("http://[{host}]:{port}"),
            _ => format!("http://{host}:{port}"),
        };

        Ok(Self { host, port, origin })
    }

    /// The absolute URL a request target is forwarded to.
    pub fn url_for(&self, request_target: &str) -> String {
        format!("{}{}", self.origin, request_target)
    }
}

/// One configured prefix rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    pub prefix: String,
    pub target: ProxyTarget,
}

impl ProxyRule {
    pub fn new(prefix: impl Into<String>, target: &str) -> Result<Self, Error> {
        Ok(Self {
            prefix: prefix.into(),
            target: ProxyTarget::parse(target)?,
        })
    }
}

/// The first rule, in declaration order, whose prefix starts the request target.
///
/// There is no longest-prefix preference: a broad rule declared early shadows
/// narrower ones declared after it.
pub fn find_rule<'a>(rules: &'a [ProxyRule], request_target: &str) -> Option<&'a ProxyRule> {
    rules.iter().find(|rule| request_target.starts_with(&rule.prefix))
}

/// How a message body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Empty,
    Length(u64),
    Chunked,
    UntilClose,
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Framing declared by a message's headers, or `otherwise` when it declares none.
fn framing_of(headers: &[(String, String)], otherwise: Framing) -> Result<Framing, Error> {
    if let Some(codings) = header(headers, "Transfer-Encoding") {
        let last = codings.rsplit(',').next().unwrap_or("").trim();
        if last.eq_ignore_ascii_case("chunked") {
            return Ok(Framing::Chunked);
        }
    }
    match header(headers, "Content-Length") {
        Some(value) => value
            .trim()
            .parse()
            .map(Framing::Length)
            .map_err(|_| Error::ProxyError(format!("invalid Content-Length {value:?}"))),
        None => Ok(otherwise),
    }
}

/// Status code and headers of an upstream response head.
#[derive(Debug)]
struct ResponseHead {
    status: u16,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    fn parse(head: &[u8]) -> Result<Self, Error> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.lines();

        let status_line = lines.next().unwrap_or("");
        let mut parts = status_line.split_whitespace();
        let status = match (parts.next(), parts.next()) {
            (Some(version), Some(code)) if version.starts_with("HTTP/") => code.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::ProxyError(format!("malformed status line {status_line:?}")))?;

        let headers = lines
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(Self { status, headers })
    }

    /// Interim responses are followed by another head.
    fn is_interim(&self) -> bool {
        (100..200).contains(&self.status) && self.status != 101
    }

    fn framing(&self, method: &Method) -> Result<Framing, Error> {
        if *method == Method::HEAD || self.status < 200 || self.status == 204 || self.status == 304 {
            return Ok(Framing::Empty);
        }
        framing_of(&self.headers, Framing::UntilClose)
    }
}

/// Read from `upstream` into `buf` until it holds a complete head; returns the head length.
async fn read_response_head<R>(upstream: &mut R, buf: &mut Vec<u8>) -> Result<usize, Error>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find_head_end(buf) {
            return Ok(end);
        }
        if buf.len() > MAX_RESPONSE_HEAD {
            return Err(Error::ProxyError("response head too large".to_string()));
        }
        let n = upstream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::ProxyError("upstream closed before responding".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Copy exactly `len` bytes.
async fn relay_exact<R, W>(src: &mut R, dst: &mut W, len: u64) -> Result<u64, Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(&mut (&mut *src).take(len), dst).await?;
    if copied < len {
        return Err(Error::ProxyError(format!("body ended after {copied} of {len} bytes")));
    }
    Ok(copied)
}

async fn read_chunk_line<R>(src: &mut R, line: &mut Vec<u8>) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    (&mut *src).take(MAX_CHUNK_LINE).read_until(b'\n', line).await?;
    if line.last() != Some(&b'\n') {
        return Err(Error::ProxyError("truncated chunked body".to_string()));
    }
    Ok(())
}

fn chunk_size(line: &[u8]) -> Result<u64, Error> {
    let text = String::from_utf8_lossy(line);
    let digits = text.split(';').next().unwrap_or("").trim();
    u64::from_str_radix(digits, 16)
        .map_err(|_| Error::ProxyError(format!("invalid chunk size {digits:?}")))
}

/// Copy a chunked body through its last chunk and trailer section, framing included.
async fn relay_chunked<R, W>(src: &mut R, dst: &mut W) -> Result<u64, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut relayed = 0;
    let mut line = Vec::new();
    loop {
        read_chunk_line(src, &mut line).await?;
        dst.write_all(&line).await?;
        relayed += line.len() as u64;

        let size = chunk_size(&line)?;
        if size == 0 {
            break;
        }
        // data plus its CRLF
        let len = size
            .checked_add(2)
            .ok_or_else(|| Error::ProxyError("chunk size overflow".to_string()))?;
        relayed += relay_exact(src, dst, len).await?;
    }

    loop {
        read_chunk_line(src, &mut line).await?;
        dst.write_all(&line).await?;
        relayed += line.len() as u64;
        if line == b"\r\n" || line == b"\n" {
            return Ok(relayed);
        }
    }
}

async fn relay_body<R, W>(src: &mut R, dst: &mut W, framing: Framing) -> Result<u64, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    match framing {
        Framing::Empty => Ok(0),
        Framing::Length(len) => relay_exact(src, dst, len).await,
        Framing::Chunked => relay_chunked(src, dst).await,
        Framing::UntilClose => Ok(tokio::io::copy(src, dst).await?),
    }
}

/// Relay one request to `target` and its response back to `client`.
///
/// `buffered` holds everything already read from the client, starting with
/// the head of `request` and possibly the start of its body. Only the head
/// and the body it declares are sent upstream; anything after them is
/// dropped along with the connection.
pub async fn forward<S>(
    client: &mut S,
    request: &HttpRequest,
    buffered: &[u8],
    target: &ProxyTarget,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut upstream = TcpStream::connect((target.host.as_str(), target.port)).await?;

    let (head, rest) = buffered.split_at(request.head_len);
    upstream.write_all(head).await?;
    let sent = {
        let mut body = BufReader::new(rest.chain(&mut *client));
        relay_body(&mut body, &mut upstream, framing_of(&request.headers, Framing::Empty)?).await?
    };
    upstream.flush().await?;

    let mut buf = Vec::new();
    let response = loop {
        let end = read_response_head(&mut upstream, &mut buf).await?;
        let response = ResponseHead::parse(&buf[..end])?;
        client.write_all(&buf[..end]).await?;
        buf.drain(..end);
        if !response.is_interim() {
            break response;
        }
    };

    let received = {
        let mut body = BufReader::new((&buf[..]).chain(&mut upstream));
        relay_body(&mut body, client, response.framing(&request.method)?).await?
    };
    client.flush().await?;

    debug!(
        "Proxy to {host}:{port} answered {status}, {sent} body bytes up, {received} body bytes down",
        host = target.host,
        port = target.port,
        status = response.status,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<ProxyRule> {
        pairs.iter().map(|(p, t)| ProxyRule::new(*p, t).unwrap()).collect()
    }

    #[test]
    fn first_declared_prefix_wins() {
        let rules = rules(&[("/api/", "http://localhost:9000"), ("/api/v2/", "http://localhost:9002")]);
        let rule = find_rule(&rules, "/api/v2/users").unwrap();
        assert_eq!(rule.target.port, 9000);
    }

    #[test]
    fn prefix_must_match_from_start() {
        let rules = rules(&[("/api/", "http://localhost:9000")]);
        assert!(find_rule(&rules, "/static/api/x").is_none());
        assert!(find_rule(&rules, "/api").is_none());
        assert!(find_rule(&rules, "/api/?q=1").is_some());
    }

    #[test]
    fn forwarded_url_reuses_request_target() {
        let target = ProxyTarget::parse("http://localhost:9000").unwrap();
        assert_eq!(target.url_for("/api/widgets"), "http://localhost:9000/api/widgets");
        assert_eq!(target.url_for("/api/widgets?page=2"), "http://localhost:9000/api/widgets?page=2");
    }

    #[test]
    fn parses_hosts_and_default_port() {
        let target = ProxyTarget::parse("http://example.com/ignored/path").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 80);

        let target = ProxyTarget::parse("http://[::1]:8000").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.url_for("/x"), "http://[::1]:8000/x");
    }

    #[test]
    fn rejects_unsupported_targets() {
        assert!(matches!(
            ProxyTarget::parse("https://localhost:9000"),
            Err(Error::InvalidProxyTarget { .. })
        ));
        assert!(matches!(
            ProxyTarget::parse("not a url"),
            Err(Error::InvalidProxyTarget { .. })
        ));
    }

    #[test]
    fn chunked_encoding_takes_precedence_over_length() {
        let headers = vec![
            ("Content-Length".to_string(), "10".to_string()),
            ("transfer-encoding".to_string(), "gzip, chunked".to_string()),
        ];
        assert_eq!(framing_of(&headers, Framing::Empty).unwrap(), Framing::Chunked);
        assert_eq!(framing_of(&headers[..1], Framing::Empty).unwrap(), Framing::Length(10));
        assert_eq!(framing_of(&[], Framing::UntilClose).unwrap(), Framing::UntilClose);

        let bad = vec![("Content-Length".to_string(), "ten".to_string())];
        assert!(matches!(framing_of(&bad, Framing::Empty), Err(Error::ProxyError(_))));
    }

    #[test]
    fn bodiless_responses() {
        let head = ResponseHead::parse(b"HTTP/1.1 204 No Content\r\nContent-Length: 3\r\n\r\n").unwrap();
        assert_eq!(head.framing(&Method::GET).unwrap(), Framing::Empty);

        let head = ResponseHead::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n").unwrap();
        assert_eq!(head.framing(&Method::HEAD).unwrap(), Framing::Empty);
        assert_eq!(head.framing(&Method::GET).unwrap(), Framing::Length(3));

        let head = ResponseHead::parse(b"HTTP/1.0 200 OK\r\n\r\n").unwrap();
        assert_eq!(head.framing(&Method::GET).unwrap(), Framing::UntilClose);

        let head = ResponseHead::parse(b"HTTP/1.1 100 Continue\r\n\r\n").unwrap();
        assert!(head.is_interim());
        assert!(ResponseHead::parse(b"garbage\r\n\r\n").is_err());
    }

    #[tokio::test]
    async fn chunked_body_stops_after_trailers() {
        let wire: &[u8] = b"5;ext=1\r\nhello\r\n0\r\nX-Trailer: 1\r\n\r\nGET /next HTTP/1.1\r\n";
        let mut src = BufReader::new(wire);
        let mut out = Vec::new();

        let relayed = relay_body(&mut src, &mut out, Framing::Chunked).await.unwrap();
        let expected: &[u8] = b"5;ext=1\r\nhello\r\n0\r\nX-Trailer: 1\r\n\r\n";
        assert_eq!(out, expected);
        assert_eq!(relayed, expected.len() as u64);
    }

    #[tokio::test]
    async fn short_bodies_are_errors() {
        let mut out = Vec::new();
        let mut src = BufReader::new(&b"abc"[..]);
        assert!(matches!(
            relay_body(&mut src, &mut out, Framing::Length(5)).await,
            Err(Error::ProxyError(_))
        ));

        let mut src = BufReader::new(&b"5\r\nhel"[..]);
        assert!(relay_body(&mut src, &mut out, Framing::Chunked).await.is_err());
    }

    #[tokio::test]
    async fn length_framing_leaves_the_rest_unread() {
        let mut src = BufReader::new(&b"hello, next request"[..]);
        let mut out = Vec::new();
        relay_body(&mut src, &mut out, Framing::Length(5)).await.unwrap();
        assert_eq!(out, b"hello");
    }
}
