//! OpenAI chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatModel, LlmClient, LlmError};

/// The chat-completions API accepts at most this many stop sequences.
const MAX_STOP_SEQUENCES: usize = 4;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Each completion is sent as a single user message; the agent keeps its
/// whole transcript in the prompt text.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: ChatModel,
    temperature: f32,
    timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [RequestMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [String],
}

fn no_stop(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: ChatModel,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chatmof/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
            temperature,
            timeout,
        })
    }

    pub fn model(&self) -> ChatModel {
        self.model
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str, stop: &[String]) -> Result<String, LlmError> {
        let stop = &stop[..stop.len().min(MAX_STOP_SEQUENCES)];
        let body = CompletionRequest {
            model: self.model.as_str(),
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stop,
        };

        tracing::debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            "Requesting completion"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Authentication(message),
                429 => LlmError::RateLimited(message),
                code => LlmError::Api {
                    status: code,
                    message,
                },
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport(e))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::Empty)
    }
}

impl OpenAiClient {
    fn map_transport(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Transport(e)
        }
    }
}
