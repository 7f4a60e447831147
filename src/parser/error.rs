//! Error types for the HTTP parser.

use thiserror::Error;

/// Errors that can occur during HTTP request parsing.
#[derive(Debug, Error)]
pub enum Error {
    /// The method token contains characters not allowed in an HTTP token.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request target is missing or not in origin form.
    #[error("Invalid request target: {0}")]
    InvalidTarget(String),

    /// The request line is malformed (wrong format or missing components).
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The HTTP version in the request is not supported.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A required header is missing from the request.
    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    /// A header line has no colon or an empty name.
    #[error("Invalid header line: {0}")]
    InvalidHeaderFormat(String),

    /// The request is empty.
    #[error("Empty request")]
    EmptyRequest,

    /// The input ends before the blank line terminating the head.
    #[error("Incomplete request head")]
    IncompleteHead,

    /// The head did not fit in the read buffer.
    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),
}
