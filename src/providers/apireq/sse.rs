//! Parses a stream of JSON objects delivered as server-sent events. It
//! consumes the byte stream produced by [`reqwest::Response::bytes_stream`]
//! and yields one deserialized object per event, incrementally.
//!
//! Only the `data` field is interpreted. `event`, `id` and `retry` lines and
//! comments are skipped. A `data: [DONE]` event ends the stream, as does the
//! end of the body.

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::marker::Unpin;

use super::TransportError;

/// Upper bound on bytes held for a single event (16 MiB).
const DEFAULT_MAX_EVENT_SIZE: usize = 1 << 24;

const DONE_SENTINEL: &[u8] = b"[DONE]";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("an event exceeded the {0} byte streaming buffer")]
    EventTooLarge(usize),

    #[error("failed to deserialize a streamed JSON object \"{blob}\"")]
    Deserialization {
        blob: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("the response stream failed")]
    StreamFailed(#[source] TransportError),
}

pub(crate) struct SseJsonStream<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream: S,
    buf: Vec<u8>,
    // Prefix of `buf` already known to contain no newline
    scanned: usize,
    data: Vec<u8>,
    max_size: usize,
    finished: bool,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin> SseJsonStream<S> {
    pub(crate) fn new(stream: S) -> SseJsonStream<S> {
        Self::with_max_size(stream, DEFAULT_MAX_EVENT_SIZE)
    }

    pub(crate) fn with_max_size(stream: S, max_size: usize) -> SseJsonStream<S> {
        SseJsonStream {
            stream,
            buf: Vec::with_capacity(1 << 10),
            scanned: 0,
            data: Vec::new(),
            max_size,
            finished: false,
        }
    }

    /// Removes the next complete line from the buffer, without its `[\r]\n`.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        match self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;

                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();

                if line.last() == Some(&b'\r') {
                    line.pop();
                }

                self.scanned = 0;

                Some(line)
            }
            None => {
                self.scanned = self.buf.len();

                None
            }
        }
    }

    /// Feeds a line into the pending event. Returns true once a blank line
    /// dispatches an event which carries data.
    fn process_line(&mut self, line: &[u8]) -> bool {
        if line.is_empty() {
            return !self.data.is_empty();
        }

        let (field, value) = match line.iter().position(|&b| b == b':') {
            // Comment
            Some(0) => return false,
            Some(i) => {
                let value = &line[i + 1..];

                (&line[..i], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &line[line.len()..]),
        };

        if field != b"data" {
            return false;
        }

        if value == DONE_SENTINEL {
            self.finished = true;
            return false;
        }

        if !self.data.is_empty() {
            self.data.push(b'\n');
        }

        self.data.extend_from_slice(value);

        false
    }

    async fn next_data(&mut self) -> Option<Result<Vec<u8>, Error>> {
        loop {
            if self.finished {
                return None;
            }

            while let Some(line) = self.take_line() {
                if self.process_line(&line) {
                    return Some(Ok(std::mem::take(&mut self.data)));
                }

                if self.finished {
                    return None;
                }
            }

            match self.stream.next().await {
                Some(Ok(bytes)) => {
                    if self.buf.len() + self.data.len() + bytes.len() > self.max_size {
                        self.finished = true;

                        return Some(Err(Error::EventTooLarge(self.max_size)));
                    }

                    self.buf.extend_from_slice(&bytes);
                }
                Some(Err(err)) => {
                    self.finished = true;

                    return Some(Err(Error::StreamFailed(err.into())));
                }
                None => {
                    self.finished = true;

                    // The body may end without the final blank line
                    if !self.buf.is_empty() {
                        let line = std::mem::take(&mut self.buf);
                        let line = line.strip_suffix(b"\r").unwrap_or(&line);

                        self.process_line(line);
                    }

                    if self.data.is_empty() {
                        return None;
                    }

                    return Some(Ok(std::mem::take(&mut self.data)));
                }
            }
        }
    }

    /// Deserializes the next event, or returns `None` once the stream ends.
    pub(crate) async fn next<T: DeserializeOwned>(&mut self) -> Option<Result<T, Error>> {
        let data = self.next_data().await?;

        Some(data.and_then(|bytes| {
            serde_json::from_slice::<T>(&bytes).map_err(|source| Error::Deserialization {
                blob: String::from_utf8_lossy(&bytes).into_owned(),
                source,
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde::Deserialize;

    type ChunkStream = stream::Iter<std::vec::IntoIter<reqwest::Result<Bytes>>>;

    fn chunked(chunk_size: usize, body: &'static str) -> ChunkStream {
        let chunks: Vec<reqwest::Result<Bytes>> = body
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        stream::iter(chunks)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Token {
        text: String,
    }

    async fn collect_texts(mut parser: SseJsonStream<ChunkStream>) -> Vec<String> {
        let mut texts = Vec::new();

        while let Some(token) = parser.next::<Token>().await {
            texts.push(token.expect("should parse").text);
        }

        texts
    }

    const TWO_EVENTS: &str = "data: {\"text\":\"Bon\"}\n\ndata:{\"text\":\"jour\"}\n\n";

    #[tokio::test]
    async fn test_any_chunking() {
        for chunk_size in 1..=TWO_EVENTS.len() {
            let parser = SseJsonStream::new(chunked(chunk_size, TWO_EVENTS));

            assert_eq!(collect_texts(parser).await, vec!["Bon", "jour"]);
        }
    }

    #[tokio::test]
    async fn test_comments_crlf_and_other_fields() {
        const BODY: &str = ": keep-alive\r\n\r\nevent: message\r\nid: 7\r\ndata: {\"text\":\"a\"}\r\n\r\nretry: 10\r\n\r\n";

        for chunk_size in 1..=8 {
            let parser = SseJsonStream::new(chunked(chunk_size, BODY));

            assert_eq!(collect_texts(parser).await, vec!["a"]);
        }
    }

    #[tokio::test]
    async fn test_multiline_data_is_joined() {
        const BODY: &str = "data: {\"text\":\ndata: \"merci\"}\n\n";

        let parser = SseJsonStream::new(chunked(3, BODY));

        assert_eq!(collect_texts(parser).await, vec!["merci"]);
    }

    #[tokio::test]
    async fn test_done_ends_the_stream() {
        const BODY: &str = "data: {\"text\":\"fin\"}\n\ndata: [DONE]\n\ndata: {\"text\":\"ignored\"}\n\n";

        for chunk_size in 1..=10 {
            let parser = SseJsonStream::new(chunked(chunk_size, BODY));

            assert_eq!(collect_texts(parser).await, vec!["fin"]);
        }
    }

    #[tokio::test]
    async fn test_unterminated_last_event() {
        let parser = SseJsonStream::new(chunked(4, "data: {\"text\":\"x\"}\n\ndata: {\"text\":\"y\"}"));

        assert_eq!(collect_texts(parser).await, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let mut parser = SseJsonStream::new(chunked(5, "data: {\"text\": nope}\n\n"));

        let result = parser.next::<Token>().await.unwrap();

        match result {
            Err(Error::Deserialization { blob, .. }) => assert_eq!(blob, "{\"text\": nope}"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_event() {
        let mut parser = SseJsonStream::with_max_size(chunked(4, TWO_EVENTS), 16);

        let mut saw_overflow = false;

        while let Some(result) = parser.next::<Token>().await {
            if let Err(err) = result {
                assert!(matches!(err, Error::EventTooLarge(16)));
                saw_overflow = true;
            }
        }

        assert!(saw_overflow);
    }

    #[tokio::test]
    async fn test_empty_body() {
        let parser = SseJsonStream::new(chunked(1, "\n\n"));

        assert!(collect_texts(parser).await.is_empty());
    }
}
