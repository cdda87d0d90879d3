use async_stream::try_stream;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::data_models::{ConversationMessage, Role};
use crate::error::GenerationError;

const API_VERSION: &str = "2023-06-01";

/// Fixed sampling temperature; not exposed to callers.
pub const TEMPERATURE: f32 = 0.7;

/// Text deltas in the order the provider produced them.
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub messages: Vec<ConversationMessage>,
    pub temperature: f32,
}

impl GenerationRequest {
    /// One user turn carrying a fully assembled prompt.
    pub fn from_prompt(prompt: String) -> Self {
        Self {
            system: None,
            messages: vec![ConversationMessage::user(prompt)],
            temperature: TEMPERATURE,
        }
    }

    pub fn from_conversation(system: String, history: Vec<ConversationMessage>) -> Self {
        Self {
            system: Some(system),
            messages: history,
            temperature: TEMPERATURE,
        }
    }
}

/// A streaming text-generation backend.
///
/// The returned future resolves once the provider has accepted the request,
/// so failures up to that point can still become a clean HTTP error.
pub trait GenerationProvider: Send + Sync {
    fn model_id(&self) -> &str;

    fn stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<TextStream, GenerationError>>;
}

#[derive(Debug, Serialize, PartialEq)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta {
        delta: ContentDelta,
    },
    MessageStop,
    Error {
        error: ProviderErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Shapes a request for the Messages API. The API only takes user and
/// assistant turns, so `system` messages from the history are appended to
/// the system prompt. Messages with no text are dropped.
fn build_messages_request(
    request: &GenerationRequest,
    model: &str,
    max_tokens: u32,
) -> Result<MessagesRequest, GenerationError> {
    let mut system_sections: Vec<String> = request.system.iter().cloned().collect();
    let mut messages = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        if message.content.trim().is_empty() {
            continue;
        }
        match message.role {
            Role::System => system_sections.push(message.content.clone()),
            Role::User | Role::Assistant => messages.push(ApiMessage {
                role: message.role.as_str(),
                content: message.content.clone(),
            }),
        }
    }

    if messages.is_empty() {
        return Err(GenerationError::InvalidInput(
            "no user or assistant message with text content".to_string(),
        ));
    }

    let system = if system_sections.is_empty() {
        None
    } else {
        Some(system_sections.join("\n\n"))
    };

    Ok(MessagesRequest {
        model: model.to_string(),
        max_tokens,
        temperature: request.temperature,
        system,
        messages,
        stream: true,
    })
}

fn map_event_error(e: EventStreamError<reqwest::Error>) -> GenerationError {
    match e {
        EventStreamError::Utf8(_) => {
            GenerationError::InvalidResponse("invalid UTF-8 sequence in stream data".to_string())
        }
        EventStreamError::Parser(e) => {
            GenerationError::InvalidResponse(format!("invalid event stream data: {e}"))
        }
        EventStreamError::Transport(e) => GenerationError::Network(e),
    }
}

/// Anthropic Messages API client with SSE streaming.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http_client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len()))]
    async fn stream_inner(&self, request: GenerationRequest) -> Result<TextStream, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingApiKey)?;
        let payload = build_messages_request(&request, &self.model, self.max_tokens)?;

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "network error during Anthropic request");
                GenerationError::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Anthropic API error");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message: body,
            });
        }
        debug!("Anthropic accepted the request, streaming");

        let mut events = response.bytes_stream().eventsource();
        let stream = try_stream! {
            while let Some(event) = events.next().await {
                let event = event.map_err(map_event_error)?;
                if event.data.is_empty() {
                    continue;
                }
                let parsed: StreamEvent = serde_json::from_str(&event.data).map_err(|e| {
                    GenerationError::InvalidResponse(format!("failed to parse stream chunk: {e}"))
                })?;
                match parsed {
                    StreamEvent::ContentBlockDelta { delta: ContentDelta::TextDelta { text } } => {
                        if !text.is_empty() {
                            yield text;
                        }
                    }
                    StreamEvent::MessageStop => break,
                    StreamEvent::Error { error } => {
                        Err::<(), _>(GenerationError::Provider {
                            kind: error.kind,
                            message: error.message,
                        })?;
                    }
                    _ => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

impl GenerationProvider for AnthropicClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn stream(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<TextStream, GenerationError>> {
        Box::pin(self.stream_inner(request))
    }
}
