use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolError;

use super::parser::ParseError;

/// Ways a run can end without an answer.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The LLM provider rejected the API key.
    #[error("authentication with the LLM provider failed: {0}")]
    Authentication(String),

    /// A capability is switched off in this deployment.
    #[error("{0}")]
    DeploymentRestricted(String),

    #[error("malformed action ({reason}): `{completion}`")]
    MalformedAction { reason: String, completion: String },

    #[error("{0} is not a valid tool")]
    UnknownTool(String),

    #[error("agent stopped after {limit} iterations without a final answer")]
    IterationLimitExceeded { limit: usize },

    #[error("LLM completion timed out after {}s", .0.as_secs())]
    LlmTimeout(Duration),

    #[error("LLM request failed: {0}")]
    Llm(LlmError),
}

impl AgentError {
    /// Message shown to the user in place of an answer.
    pub fn user_warning(&self) -> String {
        match self {
            AgentError::Authentication(_) => "Incorrect API key provided. You can find your API key at https://platform.openai.com/account/api-keys".to_string(),
            AgentError::DeploymentRestricted(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Authentication(msg) => AgentError::Authentication(msg),
            LlmError::Timeout(after) => AgentError::LlmTimeout(after),
            other => AgentError::Llm(other),
        }
    }
}

impl From<ParseError> for AgentError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Malformed { reason, completion } => {
                AgentError::MalformedAction { reason, completion }
            }
            ParseError::UnknownTool(name) => AgentError::UnknownTool(name),
        }
    }
}

/// Only the fatal tool errors end a run; the rest are handed back.
impl TryFrom<ToolError> for AgentError {
    type Error = ToolError;

    fn try_from(e: ToolError) -> Result<Self, ToolError> {
        match e {
            ToolError::DeploymentRestricted(msg) => Ok(AgentError::DeploymentRestricted(msg)),
            ToolError::Llm(LlmError::Authentication(msg)) => Ok(AgentError::Authentication(msg)),
            other => Err(other),
        }
    }
}
