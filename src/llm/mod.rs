//! LLM client abstraction.
//!
//! The agent and the tools only ever need plain text completion: a prompt goes
//! in, a completion comes back, generation halts at any of the stop sequences.

mod mock;
mod openai;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mock::ScriptedLlm;
pub use openai::OpenAiClient;

/// Errors returned by an [`LlmClient`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("completion request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned an empty completion")]
    Empty,

    /// A scripted client ran out of responses.
    #[error("scripted LLM exhausted: {0}")]
    Script(String),
}

/// A text-completion service.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete `prompt`, stopping before any of `stop`.
    async fn complete(&self, prompt: &str, stop: &[String]) -> Result<String, LlmError>;
}

/// Chat models offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatModel {
    #[default]
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-3.5-turbo-16k")]
    Gpt35Turbo16k,
}

impl ChatModel {
    pub const ALL: [ChatModel; 3] = [Self::Gpt4, Self::Gpt35Turbo, Self::Gpt35Turbo16k];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt4 => "gpt-4",
            Self::Gpt35Turbo => "gpt-3.5-turbo",
            Self::Gpt35Turbo16k => "gpt-3.5-turbo-16k",
        }
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "unknown model: {} (use gpt-4, gpt-3.5-turbo, or gpt-3.5-turbo-16k)",
                    s
                )
            })
    }
}
