use super::SseJsonStream;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

/// The body of a streaming response, boxed so that it can outlive the
/// request that produced it.
pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

pub(crate) trait ReqwestResponseStreamExt {
    fn stream_sse(self) -> SseJsonStream<ByteStream>;
}

impl ReqwestResponseStreamExt for reqwest::Response {
    fn stream_sse(self) -> SseJsonStream<ByteStream> {
        SseJsonStream::new(Box::pin(self.bytes_stream()))
    }
}
