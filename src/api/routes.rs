//! HTTP route handlers.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;

use super::session::{run_session, LlmProvider, SessionOutcome, SessionRequest};
use super::types::{
    AskRequest, AskResponse, DoneEvent, HealthResponse, ImageRef, LogEntry, LogEntryType,
    QuestionsResponse,
};
use crate::agent::{AgentEvent, EventSink};
use crate::config::Config;
use crate::mof::ModelEntry;
use crate::tools::{ToolInfo, ToolResources};

/// Offered when no questions file is configured.
const DEFAULT_QUESTIONS: [&str; 6] = [
    "What is the density of JUKPAI?",
    "How high is the accessible surface area of XEGKUR?",
    "Which materials have the highest void fraction?",
    "Predict the hydrogen uptake at 100 bar and 77 K for LITDAV.",
    "Generate a MOF with the largest accessible surface area.",
    "Can you visualize the structure of PITPEP?",
];

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub resources: Arc<ToolResources>,
    pub provider: Arc<dyn LlmProvider>,
    pub questions: Vec<String>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn LlmProvider>) -> Self {
        let resources = Arc::new(ToolResources::from_config(&config));
        let questions = load_questions(config.data.questions_path.as_deref());
        Self {
            config,
            resources,
            provider,
            questions,
        }
    }
}

/// One question per non-empty line, or the built-in list.
fn load_questions(path: Option<&Path>) -> Vec<String> {
    let Some(path) = path else {
        return DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect();
    };
    match std::fs::read_to_string(path) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read questions file: {}", e);
            DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect()
        }
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn questions(State(state): State<Arc<AppState>>) -> Json<QuestionsResponse> {
    Json(QuestionsResponse {
        questions: state.questions.clone(),
    })
}

/// Property-model catalogue.
pub async fn models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ModelEntry>>, (StatusCode, String)> {
    let store = state.resources.models.clone();
    tokio::task::spawn_blocking(move || store.catalog())
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub async fn tools(State(state): State<Arc<AppState>>) -> Json<Vec<ToolInfo>> {
    Json(state.resources.describe_tools())
}

/// Answer a question and return the whole run at once.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, String)> {
    let request = SessionRequest::validate(req, &state.config.openai)?;

    let (sink, mut rx) = EventSink::channel();
    let outcome = run_session(
        &state.config,
        &state.resources,
        state.provider.as_ref(),
        &request,
        &sink,
    )
    .await;
    drop(sink);

    let mut log = Vec::new();
    let mut images = Vec::new();
    while let Some(event) = rx.recv().await {
        if let AgentEvent::Image { material, path } = &event {
            images.push(ImageRef {
                material: material.clone(),
                path: path.clone(),
            });
        }
        let entry = LogEntry::from_event(&event);
        if state.config.verbose || entry.entry_type != LogEntryType::ToolLog {
            log.push(entry);
        }
    }

    Ok(Json(AskResponse {
        id: outcome.id,
        status: outcome.status,
        question: request.question,
        model: request.model.to_string(),
        answer: outcome.answer,
        warning: outcome.warning,
        iterations: outcome.iterations,
        log,
        images,
    }))
}

/// Answer a question, streaming agent events as they happen.
///
/// Each event is sent under its own name; a final `done` event carries the
/// outcome.
pub async fn ask_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let request = SessionRequest::validate(req, &state.config.openai)?;
    let verbose = state.config.verbose;

    let (sink, mut rx) = EventSink::channel();
    let runner = tokio::spawn(async move {
        run_session(
            &state.config,
            &state.resources,
            state.provider.as_ref(),
            &request,
            &sink,
        )
        .await
    });

    let stream = async_stream::stream! {
        while let Some(ev) = rx.recv().await {
            if !verbose && matches!(ev, AgentEvent::ToolLog { .. }) {
                continue;
            }
            match Event::default().event(ev.event_name()).json_data(&ev) {
                Ok(sse) => yield Ok(sse),
                Err(e) => {
                    tracing::error!(event = %ev.event_name(), error = %e, "Failed to serialize SSE event; dropping");
                }
            }
        }

        let done = match runner.await {
            Ok(outcome) => done_event(outcome),
            Err(e) => {
                tracing::error!("Session task failed: {}", e);
                failed_done(e.to_string())
            }
        };
        match Event::default().event("done").json_data(&done) {
            Ok(sse) => yield Ok(sse),
            Err(e) => tracing::error!(error = %e, "Failed to serialize SSE done event"),
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}

fn done_event(outcome: SessionOutcome) -> DoneEvent {
    DoneEvent {
        id: outcome.id,
        status: outcome.status,
        answer: outcome.answer,
        warning: outcome.warning,
        iterations: outcome.iterations,
    }
}

fn failed_done(message: String) -> DoneEvent {
    DoneEvent {
        id: uuid::Uuid::new_v4(),
        status: super::types::AskStatus::Warning,
        answer: None,
        warning: Some(message),
        iterations: 0,
    }
}
