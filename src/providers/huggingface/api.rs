use std::time::Duration;

use reqwest::{Client, IntoUrl, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::providers::apireq::{
    self, ByteStream, ReqwestResponseStreamExt, SseJsonStream, TransportError, Url,
};

/// The serverless router, which speaks the OpenAI chat-completion dialect.
pub(crate) const DEFAULT_API_BASE: &str = "https://router.huggingface.co";

const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

#[derive(thiserror::Error, Debug)]
pub(super) enum Error {
    /// The API base is not a URL that can be used in a network request
    #[error("invalid api base")]
    InvalidApiBase(#[source] reqwest::Error),

    /// Endpoint URL is invalid
    #[error("invalid endpoint")]
    InvalidEndpoint(
        #[from]
        #[source]
        url::ParseError,
    ),

    /// The parser failed to make sense of the response stream
    #[error("failed to parse streamed response")]
    StreamParser(
        #[from]
        #[source]
        apireq::SseError,
    ),

    #[error("{}", .0)]
    RequestFailed(
        #[from]
        #[source]
        TransportError,
    ),

    /// The request was malformed or missing some required parameters.
    #[error("{}", .0)]
    BadRequest(ApiErrorPayload),

    /// The token is missing or invalid.
    #[error("{}", .0)]
    Authentication(ApiErrorPayload),

    /// The token is valid but has no access to the model.
    #[error("{}", .0)]
    PermissionDenied(ApiErrorPayload),

    /// The model does not exist or is not served.
    #[error("{}", .0)]
    NotFound(ApiErrorPayload),

    /// The request was well-formed but the parameters were rejected.
    #[error("{}", .0)]
    UnprocessableEntity(ApiErrorPayload),

    /// Rate limit or monthly credits exhausted.
    #[error("{}", .0)]
    RateLimit(ApiErrorPayload),

    #[error("{}", .0)]
    InternalError(ApiErrorPayload),

    /// The model is loading or the service is overloaded.
    #[error("{}", .0)]
    ApiOverloaded(ApiErrorPayload),

    #[error("{}", .0)]
    UnknownStatus(ApiErrorPayload),

    /// An error event sent in the middle of a successful stream.
    #[error("{}", .0)]
    InBand(ApiErrorPayload),
}

impl Error {
    fn from_status(status: StatusCode, payload: ApiErrorPayload) -> Error {
        match status.as_u16() {
            400 => Error::BadRequest(payload),
            401 => Error::Authentication(payload),
            403 => Error::PermissionDenied(payload),
            404 => Error::NotFound(payload),
            422 => Error::UnprocessableEntity(payload),
            429 => Error::RateLimit(payload),
            500 => Error::InternalError(payload),
            502..=504 => Error::ApiOverloaded(payload),
            _ => Error::UnknownStatus(payload),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Debug)]
pub(super) struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/* Structures to serialize /v1/chat/completions */

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'o> {
    model: &'o str,
    messages: &'o [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stream: bool,
}

/* Structures to deserialize /v1/chat/completions */

#[derive(Deserialize, Debug, Default)]
pub(super) struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(super) struct Choice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Usage {
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

#[derive(Deserialize, Debug)]
pub(super) struct ChatCompletionChunk {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/* API Errors */

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(super) struct ApiErrorPayload {
    pub message: String,
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
}

impl std::fmt::Display for ApiErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.typ {
            Some(typ) => write!(f, "{} ({})", self.message, typ),
            None => write!(f, "{}", self.message),
        }
    }
}

/// The router reports errors OpenAI-style, text-generation-inference
/// backends report them flat. Both can also appear as stream events.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ErrorBody {
    Nested {
        error: ApiErrorPayload,
    },
    Flat {
        error: String,
        #[serde(default)]
        error_type: Option<String>,
    },
}

impl From<ErrorBody> for ApiErrorPayload {
    fn from(value: ErrorBody) -> Self {
        match value {
            ErrorBody::Nested { error } => error,
            ErrorBody::Flat { error, error_type } => ApiErrorPayload {
                message: error,
                typ: error_type,
            },
        }
    }
}

impl ApiErrorPayload {
    /// Builds a payload from an error response body, which is not always JSON.
    fn from_body(status: StatusCode, body: &str) -> ApiErrorPayload {
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
            return parsed.into();
        }

        let body = body.trim();

        let message = if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("no error message")
                .to_string()
        } else {
            body.to_string()
        };

        ApiErrorPayload { message, typ: None }
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StreamEvent {
    Error(ErrorBody),
    Chunk(ChatCompletionChunk),
}

pub(super) struct StreamingChatResponse {
    stream: SseJsonStream<ByteStream>,
}

impl StreamingChatResponse {
    pub(super) async fn next(&mut self) -> Option<Result<ChatCompletionChunk, Error>> {
        let event = self.stream.next::<StreamEvent>().await?;

        Some(match event {
            Ok(StreamEvent::Chunk(chunk)) => {
                trace!(choices = chunk.choices.len(), "received chunk");

                Ok(chunk)
            }
            Ok(StreamEvent::Error(body)) => Err(Error::InBand(body.into())),
            Err(err) => Err(err.into()),
        })
    }
}

pub(super) struct HuggingFaceApi {
    endpoint: Url,
    api_key: Option<String>,
    client: Client,
}

impl HuggingFaceApi {
    pub(super) fn new<U: IntoUrl>(
        api_base: U,
        api_key: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<HuggingFaceApi, Error> {
        let mut api_base = api_base.into_url().map_err(Error::InvalidApiBase)?;

        // Keep any path prefix of the base when joining
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let endpoint = api_base.join(CHAT_COMPLETIONS_PATH)?;

        let mut builder = Client::builder();

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Ok(HuggingFaceApi {
            endpoint,
            api_key: api_key.map(str::to_string),
            client,
        })
    }

    pub(super) async fn streaming_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f64,
        top_p: f64,
    ) -> Result<StreamingChatResponse, Error> {
        debug!(
            endpoint = %self.endpoint,
            model,
            messages = messages.len(),
            max_tokens,
            temperature,
            top_p,
            "requesting streamed chat completion"
        );

        let mut request = self.client.post(self.endpoint.clone());

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let res = request
            .json(&ChatCompletionRequest {
                model,
                messages,
                max_tokens,
                temperature,
                top_p,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let status = res.status();

        if status.is_success() {
            Ok(StreamingChatResponse {
                stream: res.stream_sse(),
            })
        } else {
            let body = res
                .text()
                .await
                .map_err(|e| Error::RequestFailed(e.into()))?;

            debug!(%status, "completion request rejected");

            Err(Error::from_status(
                status,
                ApiErrorPayload::from_body(status, &body),
            ))
        }
    }
}
