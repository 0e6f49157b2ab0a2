//! Core agent loop implementation.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::llm::LlmClient;
use crate::tools::{ToolContext, ToolRegistry};

use super::error::AgentError;
use super::events::{AgentEvent, EventSink};
use super::parser::{ActionKind, ActionParser, ParseError};
use super::prompt::PromptTemplate;
use super::transcript::{Transcript, Turn};

/// What to do when a completion cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsePolicy {
    /// End the run with the parse error.
    #[default]
    Abort,
    /// Show the model what went wrong and let it try again.
    RetryWithCorrection,
}

/// Limits and policies for a run.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub max_iterations: usize,
    pub parse_policy: ParsePolicy,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            parse_policy: ParsePolicy::Abort,
            llm_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&AgentConfig> for AgentOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            parse_policy: if config.parse_retry {
                ParsePolicy::RetryWithCorrection
            } else {
                ParsePolicy::Abort
            },
            llm_timeout: config.llm_timeout,
            tool_timeout: config.tool_timeout,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub answer: String,
    pub transcript: Transcript,
    /// Completions requested, including the one carrying the answer.
    pub iterations: usize,
}

/// Text observation produced by dispatching one action.
struct Observation {
    text: String,
    is_error: bool,
}

/// The question-answering agent.
///
/// Holds everything a run needs; the transcript itself lives only inside
/// [`Agent::run`].
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    parser: ActionParser,
    tools: ToolRegistry,
    prompt: PromptTemplate,
    options: AgentOptions,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        parser: ActionParser,
        tools: ToolRegistry,
        options: AgentOptions,
    ) -> Self {
        Self {
            llm,
            parser,
            tools,
            prompt: PromptTemplate::default(),
            options,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer `question`, reporting progress to `events`.
    pub async fn run(&self, question: &str, events: &EventSink) -> Result<RunOutput, AgentError> {
        let mut transcript = Transcript::new(question);
        let ctx = ToolContext::new(events.clone());
        let stop = self.parser.stop_sequences();

        tracing::info!(
            question_len = question.len(),
            tools = self.tools.len(),
            max_iterations = self.options.max_iterations,
            "Starting agent run"
        );

        for iteration in 0..self.options.max_iterations {
            tracing::debug!("Agent iteration {}", iteration + 1);

            let prompt = self.prompt.render(&self.tools, &transcript);
            let completion = self.complete(&prompt, &stop).await?;

            let parsed = match self.parser.parse(&completion, &self.tools) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.recover(e, &completion, &mut transcript, events)?;
                    continue;
                }
            };

            if let Some(thought) = parsed.thought {
                events.emit(AgentEvent::Thought {
                    content: thought.clone(),
                });
                transcript.push(Turn::AgentThought { text: thought });
            }

            match parsed.kind {
                ActionKind::FinalAnswer(answer) => {
                    tracing::info!(iterations = iteration + 1, "Agent produced final answer");
                    events.emit(AgentEvent::FinalAnswer {
                        content: answer.clone(),
                    });
                    transcript.push(Turn::FinalAnswer {
                        text: answer.clone(),
                    });
                    return Ok(RunOutput {
                        answer,
                        transcript,
                        iterations: iteration + 1,
                    });
                }
                ActionKind::Action { tool, input } => {
                    events.emit(AgentEvent::ToolCall {
                        tool: tool.clone(),
                        input: input.clone(),
                    });
                    transcript.push(Turn::AgentAction {
                        tool: tool.clone(),
                        input: input.clone(),
                    });

                    let observation = self.dispatch(&tool, &input, &ctx).await?;

                    events.emit(AgentEvent::Observation {
                        tool,
                        content: observation.text.clone(),
                        is_error: observation.is_error,
                    });
                    transcript.push(Turn::ToolObservation {
                        text: observation.text,
                        is_error: observation.is_error,
                    });
                }
            }
        }

        tracing::warn!(
            limit = self.options.max_iterations,
            "Agent hit iteration limit"
        );
        Err(AgentError::IterationLimitExceeded {
            limit: self.options.max_iterations,
        })
    }

    async fn complete(&self, prompt: &str, stop: &[String]) -> Result<String, AgentError> {
        match tokio::time::timeout(self.options.llm_timeout, self.llm.complete(prompt, stop)).await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(AgentError::LlmTimeout(self.options.llm_timeout)),
        }
    }

    /// Apply the parse policy to a completion that did not parse.
    fn recover(
        &self,
        error: ParseError,
        completion: &str,
        transcript: &mut Transcript,
        events: &EventSink,
    ) -> Result<(), AgentError> {
        match self.options.parse_policy {
            ParsePolicy::Abort => {
                tracing::warn!("Aborting run on unparsable completion: {}", error);
                Err(error.into())
            }
            ParsePolicy::RetryWithCorrection => {
                tracing::debug!("Asking model to correct its format: {}", error);
                let correction = match &error {
                    ParseError::UnknownTool(name) => format!(
                        "{} is not a valid tool, try one of [{}].",
                        name,
                        self.tools.names().collect::<Vec<_>>().join(", ")
                    ),
                    ParseError::Malformed { reason, .. } => format!(
                        "Invalid Format: {}. Respond with 'Action:' and 'Action Input:' lines, or with 'Final Answer:'.",
                        reason
                    ),
                };
                events.emit(AgentEvent::Warning {
                    message: correction.clone(),
                });
                let text = completion.trim();
                if !text.is_empty() {
                    transcript.push(Turn::AgentThought {
                        text: text.to_string(),
                    });
                }
                transcript.push(Turn::ToolObservation {
                    text: correction,
                    is_error: true,
                });
                Ok(())
            }
        }
    }

    /// Run one tool. Recoverable failures come back as error observations.
    async fn dispatch(
        &self,
        name: &str,
        input: &str,
        ctx: &ToolContext,
    ) -> Result<Observation, AgentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;

        tracing::info!(tool = %name, input_len = input.len(), "Calling tool");

        match tokio::time::timeout(self.options.tool_timeout, tool.run(input, ctx)).await {
            Ok(Ok(text)) => Ok(Observation {
                text,
                is_error: false,
            }),
            Ok(Err(e)) => match AgentError::try_from(e) {
                Ok(fatal) => {
                    tracing::warn!(tool = %name, "Tool raised fatal error: {}", fatal);
                    Err(fatal)
                }
                Err(e) => {
                    tracing::debug!(tool = %name, "Tool failed: {}", e);
                    Ok(Observation {
                        text: format!("Error: {}", e),
                        is_error: true,
                    })
                }
            },
            Err(_) => {
                tracing::warn!(tool = %name, "Tool timed out");
                Ok(Observation {
                    text: format!(
                        "Error: {} timed out after {}s",
                        name,
                        self.options.tool_timeout.as_secs()
                    ),
                    is_error: true,
                })
            }
        }
    }
}
