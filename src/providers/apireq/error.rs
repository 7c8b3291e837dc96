//! Wrapper around Reqwest's error type to facilitate exclusive matching

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    ConnectFailed,
    TimedOut,
    /// The connection dropped or misbehaved while the body was streaming
    BodyFailed,
    DecodingFailed,
    RedirectPolicyViolated,
    Unknown,
}

#[derive(Debug)]
pub(crate) struct TransportError {
    kind: TransportErrorKind,
    source: reqwest::Error,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::new(err)
    }
}

impl TransportError {
    pub(crate) fn new(err: reqwest::Error) -> TransportError {
        // Timeouts are also reported as connect or body errors, check them first.
        let kind = if err.is_timeout() {
            TransportErrorKind::TimedOut
        } else if err.is_connect() {
            TransportErrorKind::ConnectFailed
        } else if err.is_body() {
            TransportErrorKind::BodyFailed
        } else if err.is_decode() {
            TransportErrorKind::DecodingFailed
        } else if err.is_redirect() {
            TransportErrorKind::RedirectPolicyViolated
        } else {
            TransportErrorKind::Unknown
        };

        TransportError { kind, source: err }
    }

    pub(crate) fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TransportErrorKind::ConnectFailed => write!(f, "connection failed"),
            TransportErrorKind::TimedOut => write!(f, "timed out"),
            TransportErrorKind::BodyFailed => write!(f, "response body failed"),
            TransportErrorKind::DecodingFailed => write!(f, "decoding failed"),
            TransportErrorKind::RedirectPolicyViolated => write!(f, "redirect policy violated"),
            TransportErrorKind::Unknown => write!(f, "request failed"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}
