use std::time::Duration;

use async_trait::async_trait;
use reqwest::IntoUrl;
use tracing::debug;

use super::api;
use crate::chat::{Message, Role};
use crate::params::GenerationParameters;
use crate::providers::{
    AsyncMessageIterator, ChatProvider, Error, ErrorKind, FinishReason, MessageDelta,
    ProviderIdentifier, Usage,
};

/// The model the tutor runs on unless configured otherwise.
pub(crate) const DEFAULT_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";

impl From<api::Error> for Error {
    fn from(value: api::Error) -> Self {
        let kind = match &value {
            api::Error::Authentication(_) | api::Error::PermissionDenied(_) => {
                Some(ErrorKind::Authentication)
            }
            api::Error::BadRequest(_)
            | api::Error::InvalidApiBase(_)
            | api::Error::InvalidEndpoint(_)
            | api::Error::UnprocessableEntity(_) => Some(ErrorKind::BadRequest),
            api::Error::InternalError(_) => Some(ErrorKind::InternalError),
            api::Error::NotFound(_) => Some(ErrorKind::NotFound),
            api::Error::RateLimit(_) => Some(ErrorKind::ExcessUsage),
            api::Error::ApiOverloaded(_) => Some(ErrorKind::ApiOverloaded),
            api::Error::UnknownStatus(_) | api::Error::InBand(_) => {
                Some(ErrorKind::UnspecifiedError)
            }

            api::Error::RequestFailed(_) | api::Error::StreamParser(_) => None,
        };

        match (value, kind) {
            (api::Error::RequestFailed(err), _) => err.into(),
            (api::Error::StreamParser(err), _) => err.into(),
            (value, Some(kind)) => Error::from_source(kind, Box::new(value)),
            (value, None) => Error::from_source(ErrorKind::UnspecifiedError, Box::new(value)),
        }
    }
}

impl From<Role> for api::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::System => api::Role::System,
            Role::User => api::Role::User,
            Role::Assistant => api::Role::Assistant,
        }
    }
}

fn finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" | "eos_token" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "stop_sequence" => Some(FinishReason::StopSequence),
        _ => None,
    }
}

pub(crate) struct HuggingFaceCompletionResponse {
    inner: api::StreamingChatResponse,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl HuggingFaceCompletionResponse {
    fn new(inner: api::StreamingChatResponse) -> HuggingFaceCompletionResponse {
        HuggingFaceCompletionResponse {
            inner,
            finish_reason: None,
            usage: None,
        }
    }
}

#[async_trait]
impl AsyncMessageIterator for HuggingFaceCompletionResponse {
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>> {
        loop {
            let mut chunk = match self.inner.next().await? {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(err.into())),
            };

            if let Some(usage) = chunk.usage.take() {
                self.usage = Some(Usage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                });
            }

            // Usage-only chunks carry no choices
            if chunk.choices.is_empty() {
                continue;
            }

            let choice = std::mem::take(&mut chunk.choices[0]);

            if let Some(reason) = choice.finish_reason.as_deref() {
                self.finish_reason = finish_reason(reason);
            }

            return Some(Ok(MessageDelta {
                content: choice.delta.content.unwrap_or_default(),
            }));
        }
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

pub(crate) struct HuggingFaceProvider {
    api: api::HuggingFaceApi,
}

impl HuggingFaceProvider {
    pub(crate) fn new<U: IntoUrl>(
        api_base: U,
        api_key: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<HuggingFaceProvider, Error> {
        Ok(HuggingFaceProvider {
            api: api::HuggingFaceApi::new(api_base, api_key, timeout)?,
        })
    }
}

#[async_trait]
impl ChatProvider for HuggingFaceProvider {
    fn id(&self) -> ProviderIdentifier {
        ProviderIdentifier::HuggingFace
    }

    async fn stream_completion(
        &self,
        model: &str,
        messages: &[Message],
        params: &GenerationParameters,
    ) -> Result<Box<dyn AsyncMessageIterator>, Error> {
        let messages: Vec<api::ChatMessage> = messages
            .iter()
            .map(|m| api::ChatMessage {
                role: m.role.into(),
                content: m.content.clone(),
            })
            .collect();

        let response = self
            .api
            .streaming_chat_completion(
                model,
                &messages,
                params.max_tokens,
                params.temperature,
                params.top_p,
            )
            .await?;

        debug!(provider = %self.id(), model, "completion stream opened");

        Ok(Box::new(HuggingFaceCompletionResponse::new(response)))
    }
}
