//! A utility module with helpers for making and parsing API requests.

mod error;
mod provider;
mod sse;
mod stream_ext;

pub(crate) use error::TransportError;
pub(crate) use reqwest::Url;

pub(crate) use sse::Error as SseError;
pub(crate) use sse::SseJsonStream;
pub(crate) use stream_ext::{ByteStream, ReqwestResponseStreamExt};
