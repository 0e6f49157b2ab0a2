//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentEvent;

/// Request to answer one question.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    /// OpenAI key; falls back to the server's default key
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub question: String,

    /// `gpt-4`, `gpt-3.5-turbo` or `gpt-3.5-turbo-16k`
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature in [0, 1]
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AskStatus {
    /// The agent produced a final answer
    Completed,
    /// The run ended early; see `warning`
    Warning,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub id: Uuid,

    pub status: AskStatus,

    pub question: String,

    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// Agent iterations used
    pub iterations: usize,

    pub log: Vec<LogEntry>,

    pub images: Vec<ImageRef>,
}

/// A single entry in the run log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Timestamp (RFC 3339)
    pub timestamp: String,

    pub entry_type: LogEntryType,

    /// Human-readable line
    pub content: String,
}

impl LogEntry {
    pub fn from_event(event: &AgentEvent) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            entry_type: LogEntryType::from(event),
            content: event.log_line(),
        }
    }
}

/// Types of log entries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    Thought,
    ToolCall,
    Observation,
    ToolLog,
    Image,
    Answer,
    Warning,
}

impl From<&AgentEvent> for LogEntryType {
    fn from(event: &AgentEvent) -> Self {
        match event {
            AgentEvent::Thought { .. } => Self::Thought,
            AgentEvent::ToolCall { .. } => Self::ToolCall,
            AgentEvent::Observation { .. } => Self::Observation,
            AgentEvent::ToolLog { .. } => Self::ToolLog,
            AgentEvent::Image { .. } => Self::Image,
            AgentEvent::FinalAnswer { .. } => Self::Answer,
            AgentEvent::Warning { .. } => Self::Warning,
        }
    }
}

/// A rendered structure to show next to the answer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageRef {
    pub material: String,
    pub path: String,
}

/// Terminal event of a streamed run.
#[derive(Debug, Clone, Serialize)]
pub struct DoneEvent {
    pub id: Uuid,
    pub status: AskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub iterations: usize,
}

/// Example questions offered by the UI.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}
