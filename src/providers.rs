//! Traits and type definitions for streamed chat completions.
//!
//! Every completion backend implements [`ChatProvider`]. A provider takes a
//! role-tagged transcript plus [`GenerationParameters`] and hands back an
//! [`AsyncMessageIterator`] which yields the reply one delta at a time.
//!
//! ## Error Handling
//!
//! Backends report failures in their own terms (HTTP status codes, in-band
//! error events, transport failures). These are folded into [`Error`], whose
//! [`ErrorKind`] gives the general category. The relay does not distinguish
//! between kinds; they exist for logging and for the provider tests.

mod apireq;
mod huggingface;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;

use crate::chat::Message;
use crate::params::GenerationParameters;

pub(crate) use self::huggingface::{HuggingFaceProvider, DEFAULT_API_BASE, DEFAULT_MODEL};

/// Identifies a provider in logs and diagnostics.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ProviderIdentifier {
    HuggingFace,
    #[cfg(test)]
    Scripted,
}

/// General categories of errors returned by a [`ChatProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// Failed to connect to the inference service (DNS, routing, refused).
    Connection,
    /// A request timed out.
    TimedOut,
    /// The token is missing, invalid, or lacks access to the model.
    Authentication,
    /// A rate limit was reached or a quota was exceeded.
    ExcessUsage,
    /// The servers are overloaded or the model is still loading.
    ApiOverloaded,
    /// The requested model was not found.
    NotFound,
    /// The request was malformed or rejected (HTTP 4xx).
    BadRequest,
    /// The server encountered an error (HTTP 5xx).
    InternalError,
    /// A response could not be parsed or violated the client's assumptions.
    UnexpectedResponse,
    /// Anything else.
    UnspecifiedError,
}

#[derive(Debug)]
pub(crate) struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub(crate) fn from_kind(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    pub(crate) fn from_source(kind: ErrorKind, source: Box<dyn StdError + Send + Sync>) -> Error {
        Error {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Connection => "failed to connect to the inference service",
            ErrorKind::TimedOut => "request timed out",
            ErrorKind::Authentication => "authentication failed or not provided",
            ErrorKind::ExcessUsage => "rate limit exceeded or quota crossed",
            ErrorKind::ApiOverloaded => "the inference service is currently overloaded",
            ErrorKind::NotFound => "the requested model was not found",
            ErrorKind::BadRequest => "the request was bad or malformed",
            ErrorKind::InternalError => "the server encountered an internal error",
            ErrorKind::UnexpectedResponse => "the response was unexpected or malformed",
            ErrorKind::UnspecifiedError => "an unspecified error occurred",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

/// The reason why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum FinishReason {
    /// The model produced a stop token.
    Stop,
    /// `max_tokens` was reached.
    Length,
    /// A stop sequence was matched.
    StopSequence,
}

/// One streamed chunk of the reply. Usually a single token; may be empty.
#[derive(Debug, Clone)]
pub(crate) struct MessageDelta {
    pub content: String,
}

/// Token accounting reported by the service, when it reports any.
#[derive(Debug, Clone, Default)]
pub(crate) struct Usage {
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

/// A streamed response from a completion.
#[async_trait]
pub(crate) trait AsyncMessageIterator: Send {
    /// The next chunk of the message.
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>>;

    /// Why the model stopped. Only known once the iterator is exhausted.
    fn finish_reason(&self) -> Option<FinishReason>;

    /// Usage for this request. Only known once the iterator is exhausted,
    /// and only if the service reported it.
    fn usage(&self) -> Option<&Usage>;
}

/// A trait implemented by all chat providers.
#[async_trait]
pub(crate) trait ChatProvider: Send + Sync {
    fn id(&self) -> ProviderIdentifier;

    /// Takes the transcript and produces a new, streamed message generated
    /// by the model in response.
    async fn stream_completion(
        &self,
        model: &str,
        messages: &[Message],
        params: &GenerationParameters,
    ) -> Result<Box<dyn AsyncMessageIterator>, Error>;
}
