//! Conversions between request-level errors and provider error types

use super::error::TransportErrorKind;
use crate::providers::apireq::{SseError, TransportError};
use crate::providers::{Error, ErrorKind};

impl From<SseError> for Error {
    fn from(value: SseError) -> Self {
        let kind = match &value {
            SseError::Deserialization { .. } | SseError::EventTooLarge(_) => {
                ErrorKind::UnexpectedResponse
            }
            SseError::StreamFailed(err) => transport_kind(err),
        };

        Error::from_source(kind, Box::new(value))
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        Error::from_source(transport_kind(&value), Box::new(value))
    }
}

fn transport_kind(err: &TransportError) -> ErrorKind {
    match err.kind() {
        TransportErrorKind::ConnectFailed => ErrorKind::Connection,
        TransportErrorKind::TimedOut => ErrorKind::TimedOut,
        TransportErrorKind::DecodingFailed | TransportErrorKind::RedirectPolicyViolated => {
            ErrorKind::UnexpectedResponse
        }
        TransportErrorKind::BodyFailed | TransportErrorKind::Unknown => {
            ErrorKind::UnspecifiedError
        }
    }
}
