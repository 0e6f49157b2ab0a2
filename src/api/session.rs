//! One question, start to finish: validate the request, wire a per-session
//! LLM client and tool registry, run the agent, and turn the outcome into
//! what the UI shows.

use std::sync::Arc;

use axum::http::StatusCode;
use uuid::Uuid;

use super::types::{AskRequest, AskStatus};
use crate::agent::{ActionParser, Agent, AgentError, AgentEvent, AgentOptions, EventSink};
use crate::config::{Config, LlmConfig};
use crate::llm::{ChatModel, LlmClient, LlmError, OpenAiClient};
use crate::tools::ToolResources;

pub const MISSING_KEY: &str = "You have to enter your OpenAI api key!";
pub const EMPTY_QUESTION: &str = "Please enter a question.";

/// A validated request.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub api_key: String,
    pub question: String,
    pub model: ChatModel,
    pub temperature: f32,
}

impl SessionRequest {
    /// Check a request against the server defaults.
    pub fn validate(req: AskRequest, config: &LlmConfig) -> Result<Self, (StatusCode, String)> {
        let api_key = req
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| config.api_key.clone())
            .ok_or_else(|| (StatusCode::BAD_REQUEST, MISSING_KEY.to_string()))?;

        let question = req.question.trim().to_string();
        if question.is_empty() {
            return Err((StatusCode::BAD_REQUEST, EMPTY_QUESTION.to_string()));
        }

        let model = match req.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(name) => name
                .parse::<ChatModel>()
                .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
            None => config.default_model,
        };

        let temperature = req.temperature.unwrap_or(config.temperature);
        if !(0.0..=1.0).contains(&temperature) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("temperature must be between 0 and 1, got {}", temperature),
            ));
        }

        Ok(Self {
            api_key,
            question,
            model,
            temperature,
        })
    }
}

/// Creates the LLM client for a session.
pub trait LlmProvider: Send + Sync {
    fn client(&self, request: &SessionRequest) -> Result<Arc<dyn LlmClient>, LlmError>;
}

/// Talks to the OpenAI chat-completions API.
pub struct OpenAiProvider {
    config: LlmConfig,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl LlmProvider for OpenAiProvider {
    fn client(&self, request: &SessionRequest) -> Result<Arc<dyn LlmClient>, LlmError> {
        let client = OpenAiClient::new(
            request.api_key.clone(),
            &self.config.base_url,
            request.model,
            request.temperature,
            self.config.timeout,
        )?;
        Ok(Arc::new(client))
    }
}

/// How a session ended.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub id: Uuid,
    pub status: AskStatus,
    pub answer: Option<String>,
    pub warning: Option<String>,
    pub iterations: usize,
}

/// Run one question. Failures are reported through `events` and the outcome,
/// never as a partial answer.
pub async fn run_session(
    config: &Config,
    resources: &ToolResources,
    provider: &dyn LlmProvider,
    request: &SessionRequest,
    events: &EventSink,
) -> SessionOutcome {
    let id = Uuid::new_v4();
    tracing::info!(
        session_id = %id,
        model = %request.model,
        temperature = request.temperature,
        "Session started"
    );

    let llm = match provider.client(request) {
        Ok(llm) => llm,
        Err(e) => return failed(id, AgentError::from(e), 0, events),
    };

    let tools = resources.build_registry(llm.clone());
    let agent = Agent::new(
        llm,
        ActionParser::new(),
        tools,
        AgentOptions::from(&config.agent),
    );

    match agent.run(&request.question, events).await {
        Ok(output) => {
            tracing::info!(session_id = %id, iterations = output.iterations, "Session completed");
            SessionOutcome {
                id,
                status: AskStatus::Completed,
                answer: Some(output.answer),
                warning: None,
                iterations: output.iterations,
            }
        }
        Err(e) => {
            let iterations = match &e {
                AgentError::IterationLimitExceeded { limit } => *limit,
                _ => 0,
            };
            failed(id, e, iterations, events)
        }
    }
}

fn failed(id: Uuid, error: AgentError, iterations: usize, events: &EventSink) -> SessionOutcome {
    tracing::warn!(session_id = %id, "Session ended without an answer: {}", error);
    let warning = error.user_warning();
    events.emit(AgentEvent::Warning {
        message: warning.clone(),
    });
    SessionOutcome {
        id,
        status: AskStatus::Warning,
        answer: None,
        warning: Some(warning),
        iterations,
    }
}
