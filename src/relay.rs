//! Relays one learner turn to the model and streams the reply back.
//!
//! [`respond`] builds the transcript, issues a single streaming completion
//! and yields the reply as it grows. Every yielded value is the full reply so
//! far, not a delta. Failures are never returned to the caller: they turn
//! into one apologetic text value, after which the stream ends.

use std::error::Error as StdError;

use futures_core::stream::FusedStream;
use futures_util::stream::{self, StreamExt};
use tracing::debug;

use crate::chat::{build_messages, History, Message};
use crate::params::GenerationParameters;
use crate::providers::{AsyncMessageIterator, ChatProvider, Error};

/// Prefix of the single value emitted when the completion fails.
pub(crate) const FAILURE_NOTICE: &str = "Désolé! There was an error";

enum State<'p> {
    Pending {
        provider: &'p dyn ChatProvider,
        model: &'p str,
        messages: Vec<Message>,
        params: GenerationParameters,
    },
    Streaming {
        completion: Box<dyn AsyncMessageIterator>,
        reply: String,
        chunks: usize,
    },
    Done,
}

/// Renders an error and its chain of sources on one line.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut last = text.clone();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_text = cause.to_string();

        if cause_text != last {
            text.push_str(": ");
            text.push_str(&cause_text);
            last = cause_text;
        }

        source = cause.source();
    }

    text
}

fn failure_notice(err: &Error) -> String {
    let detail = describe(err);

    debug!(kind = ?err.kind(), error = %detail, "completion failed");

    format!("{}: {}", FAILURE_NOTICE, detail)
}

async fn step(state: State<'_>) -> Option<(String, State<'_>)> {
    let (mut completion, mut reply, chunks) = match state {
        State::Done => return None,
        State::Pending {
            provider,
            model,
            messages,
            params,
        } => {
            debug!(
                provider = %provider.id(),
                model,
                messages = messages.len(),
                %params,
                "relaying turn"
            );

            match provider.stream_completion(model, &messages, &params).await {
                Ok(completion) => (completion, String::new(), 0),
                Err(err) => return Some((failure_notice(&err), State::Done)),
            }
        }
        State::Streaming {
            completion,
            reply,
            chunks,
        } => (completion, reply, chunks),
    };

    match completion.next().await {
        Some(Ok(delta)) => {
            reply.push_str(&delta.content);

            Some((
                reply.clone(),
                State::Streaming {
                    completion,
                    reply,
                    chunks: chunks + 1,
                },
            ))
        }
        Some(Err(err)) => Some((failure_notice(&err), State::Done)),
        None => {
            let usage = completion.usage();

            debug!(
                chunks,
                chars = reply.chars().count(),
                finish_reason = ?completion.finish_reason(),
                prompt_tokens = ?usage.and_then(|u| u.prompt_tokens),
                completion_tokens = ?usage.and_then(|u| u.completion_tokens),
                "completion finished"
            );

            None
        }
    }
}

/// Streams the model's reply to `message`.
///
/// The transcript is the system prompt, the normalized `history`, then
/// `message`. Nothing is sent until the stream is first polled, and exactly
/// one request is made. Each value extends the previous one; a failure at
/// any point yields a single value starting with [`FAILURE_NOTICE`] and ends
/// the stream.
pub(crate) fn respond<'p>(
    provider: &'p dyn ChatProvider,
    model: &'p str,
    message: &str,
    history: &History,
    system_prompt: &str,
    params: GenerationParameters,
) -> impl FusedStream<Item = String> + 'p {
    let messages = build_messages(system_prompt, history, message);

    let initial = State::Pending {
        provider,
        model,
        messages,
        params,
    };

    stream::unfold(initial, step).fuse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Turn;
    use crate::providers::{
        Error, ErrorKind, FinishReason, MessageDelta, ProviderIdentifier, Usage,
    };
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Script = Result<Vec<Result<&'static str, ErrorKind>>, ErrorKind>;

    struct ScriptedCompletion {
        deltas: VecDeque<Result<&'static str, ErrorKind>>,
        exhausted: bool,
    }

    #[async_trait]
    impl AsyncMessageIterator for ScriptedCompletion {
        async fn next(&mut self) -> Option<Result<MessageDelta, Error>> {
            tokio::task::yield_now().await;

            match self.deltas.pop_front() {
                Some(Ok(content)) => Some(Ok(MessageDelta {
                    content: content.to_string(),
                })),
                Some(Err(kind)) => Some(Err(Error::from_kind(kind))),
                None => {
                    self.exhausted = true;
                    None
                }
            }
        }

        fn finish_reason(&self) -> Option<FinishReason> {
            self.exhausted.then_some(FinishReason::Stop)
        }

        fn usage(&self) -> Option<&Usage> {
            None
        }
    }

    struct ScriptedProvider {
        script: Script,
        calls: AtomicUsize,
        transcripts: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(script: Script) -> ScriptedProvider {
            ScriptedProvider {
                script,
                calls: AtomicUsize::new(0),
                transcripts: Mutex::new(Vec::new()),
            }
        }

        fn replying(deltas: &[&'static str]) -> ScriptedProvider {
            Self::new(Ok(deltas.iter().map(|d| Ok(*d)).collect()))
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn id(&self) -> ProviderIdentifier {
            ProviderIdentifier::Scripted
        }

        async fn stream_completion(
            &self,
            _model: &str,
            messages: &[Message],
            _params: &GenerationParameters,
        ) -> Result<Box<dyn AsyncMessageIterator>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.transcripts.lock().unwrap().push(messages.to_vec());

            match &self.script {
                Ok(deltas) => Ok(Box::new(ScriptedCompletion {
                    deltas: deltas.iter().cloned().collect(),
                    exhausted: false,
                })),
                Err(kind) => Err(Error::from_kind(*kind)),
            }
        }
    }

    async fn collect(
        provider: &ScriptedProvider,
        message: &str,
        history: &History,
    ) -> Vec<String> {
        respond(
            provider,
            "scripted",
            message,
            history,
            "You are a friendly French tutor.",
            GenerationParameters::default(),
        )
        .collect()
        .await
    }

    #[tokio::test]
    async fn test_values_are_cumulative() {
        let deltas = ["Bon", "jour", "", " !", " Ça va ?"];
        let provider = ScriptedProvider::replying(&deltas);

        let values = collect(&provider, "Bonjour", &History::default()).await;

        assert_eq!(values.len(), deltas.len());

        for pair in values.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
        }

        assert_eq!(values.last().unwrap(), &deltas.concat());
        assert_eq!(values[2], values[1]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nothing_is_sent_until_polled() {
        let provider = ScriptedProvider::replying(&["Oui"]);

        let stream = respond(
            &provider,
            "scripted",
            "Bonjour",
            &History::default(),
            "prompt",
            GenerationParameters::default(),
        );

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        futures_util::pin_mut!(stream);

        assert_eq!(stream.next().await.as_deref(), Some("Oui"));
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.next().await, None);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transcript_sent_to_provider() {
        let provider = ScriptedProvider::replying(&["D'accord."]);

        let history = History::Pairs(vec![Turn(Some("Salut".into()), Some("Salut !".into()))]);

        collect(&provider, "Comment vas-tu ?", &history).await;

        let transcripts = provider.transcripts.lock().unwrap();

        assert_eq!(
            transcripts[0],
            vec![
                Message::system("You are a friendly French tutor."),
                Message::user("Salut"),
                Message::assistant("Salut !"),
                Message::user("Comment vas-tu ?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_failure_yields_one_notice() {
        let provider = ScriptedProvider::new(Err(ErrorKind::Authentication));

        let values = collect(&provider, "Bonjour", &History::default()).await;

        assert_eq!(values.len(), 1);
        assert!(values[0].starts_with("Désolé! There was an error: "));
        assert!(values[0].contains("authentication failed"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_the_stream() {
        let provider = ScriptedProvider::new(Ok(vec![
            Ok("Le chat"),
            Err(ErrorKind::Connection),
            Ok(" dort."),
        ]));

        let values = collect(&provider, "Traduire: the cat sleeps", &History::default()).await;

        assert_eq!(values.len(), 2);
        assert_eq!(values[0], "Le chat");
        assert!(values[1].contains("There was an error"));
        assert!(values[1].contains("failed to connect"));
    }

    #[tokio::test]
    async fn test_empty_completion() {
        let provider = ScriptedProvider::replying(&[]);

        let values = collect(&provider, "Bonjour", &History::default()).await;

        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let provider = ScriptedProvider::replying(&["un", " deux", " trois"]);

        let first_history = History::Messages(vec![Message::user("a"), Message::assistant("b")]);

        let first = respond(
            &provider,
            "scripted",
            "premier",
            &first_history,
            "prompt",
            GenerationParameters::default(),
        );
        let second = respond(
            &provider,
            "scripted",
            "second",
            &History::default(),
            "prompt",
            GenerationParameters::default(),
        );

        let (first, second): (Vec<String>, Vec<String>) =
            tokio::join!(first.collect(), second.collect());

        assert_eq!(first, second);
        assert_eq!(first.last().unwrap(), "un deux trois");

        let transcripts = provider.transcripts.lock().unwrap();
        let lengths: Vec<usize> = transcripts.iter().map(|t| t.len()).collect();

        assert_eq!(transcripts.len(), 2);
        assert!(lengths.contains(&4));
        assert!(lengths.contains(&2));
    }

    #[test]
    fn test_describe_chains_sources() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] Inner);

        #[derive(Debug, thiserror::Error)]
        #[error("inner")]
        struct Inner;

        assert_eq!(describe(&Outer(Inner)), "outer: inner");
    }
}
