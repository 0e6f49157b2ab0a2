//! Tools the agent can call.
//!
//! Every tool takes the model's `Action Input` as plain text and returns plain
//! text. Tools that need to understand free-form input issue their own nested
//! completion and parse a small marker protocol out of it.

mod generator;
mod llm_math;
mod predictor;
mod python_repl;
mod search_csv;
mod visualizer;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::agent::{fill_placeholders, AgentEvent, EventSink};
use crate::config::{Config, ToolSettings};
use crate::llm::{LlmClient, LlmError, ScriptedLlm};
use crate::mof::{
    CommandBackend, InferenceBackend, ModelStore, MofTable, StructureRenderer, StructureStore,
    SvgRenderer, UnavailableBackend,
};

pub use generator::Generator;
pub use llm_math::LlmMath;
pub use predictor::Predictor;
pub use python_repl::PythonRepl;
pub use search_csv::SearchCsv;
pub use visualizer::Visualizer;

/// Errors a tool can raise.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("material not found: {0}")]
    MaterialNotFound(String),

    #[error("model configuration error: {0}")]
    ModelConfig(String),

    /// The capability exists but is switched off here.
    #[error("{0}")]
    DeploymentRestricted(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-call context handed to a tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    events: EventSink,
}

impl ToolContext {
    pub fn new(events: EventSink) -> Self {
        Self { events }
    }

    pub fn emit(&self, event: AgentEvent) {
        self.events.emit(event);
    }

    /// Report one field of a tool's sub-protocol.
    pub fn log(&self, tool: &str, label: &str, content: impl Into<String>) {
        self.events.emit(AgentEvent::ToolLog {
            tool: tool.to_string(),
            label: label.to_string(),
            content: content.into(),
        });
    }
}

/// A named capability the agent may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model writes after `Action:`.
    fn name(&self) -> &str;

    /// One-line description shown in the agent preamble.
    fn description(&self) -> &str;

    async fn run(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Tools available to one session, in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&i) => {
                tracing::warn!(tool = %name, "Replacing already registered tool");
                self.tools[i] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// The fixed set of tools this assistant knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SearchCsv,
    Predictor,
    Generator,
    Visualizer,
    PythonRepl,
    LlmMath,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        Self::SearchCsv,
        Self::Predictor,
        Self::Generator,
        Self::Visualizer,
        Self::PythonRepl,
        Self::LlmMath,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchCsv => "search_csv",
            Self::Predictor => "predictor",
            Self::Generator => "generator",
            Self::Visualizer => "visualizer",
            Self::PythonRepl => "python_repl",
            Self::LlmMath => "llm-math",
        }
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown tool: {}", s))
    }
}

/// Read-only state shared by every session's tools.
pub struct ToolResources {
    pub table: Arc<MofTable>,
    pub structures: StructureStore,
    pub models: ModelStore,
    pub inference: Arc<dyn InferenceBackend>,
    pub renderer: Arc<dyn StructureRenderer>,
    pub settings: ToolSettings,
}

impl ToolResources {
    /// Load the lookup table and wire stores from configuration.
    ///
    /// A missing or unreadable table is not fatal: the tools that need it
    /// report the problem as an observation instead.
    pub fn from_config(config: &Config) -> Self {
        let table = match MofTable::load(&config.data.table_path, &config.data.name_column) {
            Ok(table) => {
                tracing::info!(
                    path = %config.data.table_path.display(),
                    rows = table.len(),
                    "Loaded MOF lookup table"
                );
                table
            }
            Err(e) => {
                tracing::warn!(
                    path = %config.data.table_path.display(),
                    "Failed to load MOF lookup table: {:#}",
                    e
                );
                MofTable::empty(&config.data.name_column)
            }
        };

        let inference: Arc<dyn InferenceBackend> = match &config.tools.predict_command {
            Some(command) => Arc::new(CommandBackend::new(command.clone())),
            None => Arc::new(UnavailableBackend),
        };

        Self {
            table: Arc::new(table),
            structures: StructureStore::new(&config.data.structure_dir),
            models: ModelStore::new(&config.data.model_dir),
            inference,
            renderer: Arc::new(SvgRenderer::default()),
            settings: config.tools.clone(),
        }
    }

    /// Build the registry for one session. Tools that issue nested
    /// completions share the session's LLM client.
    pub fn build_registry(&self, llm: Arc<dyn LlmClient>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for kind in &self.settings.enabled {
            let tool: Arc<dyn Tool> = match kind {
                ToolKind::SearchCsv => Arc::new(SearchCsv::new(llm.clone(), self.table.clone())),
                ToolKind::Predictor => Arc::new(Predictor::new(
                    llm.clone(),
                    self.structures.clone(),
                    self.models.clone(),
                    self.inference.clone(),
                    self.table.clone(),
                )),
                ToolKind::Generator => Arc::new(Generator::new(
                    llm.clone(),
                    self.table.clone(),
                    self.settings.gene_columns.clone(),
                    self.settings.generator.clone(),
                )),
                ToolKind::Visualizer => Arc::new(Visualizer::new(
                    llm.clone(),
                    self.structures.clone(),
                    self.renderer.clone(),
                    self.settings.visualizer_allow_list.clone(),
                    self.settings.output_dir.clone(),
                )),
                ToolKind::PythonRepl => Arc::new(PythonRepl::new(
                    self.settings.python_bin.clone(),
                    self.settings.python_timeout,
                )),
                ToolKind::LlmMath => Arc::new(LlmMath::new(llm.clone())),
            };
            registry.register(tool);
        }
        registry
    }

    /// Names and descriptions of the enabled tools, without a live session.
    pub fn describe_tools(&self) -> Vec<ToolInfo> {
        self.build_registry(Arc::new(ScriptedLlm::new(Vec::<String>::new())))
            .list_tools()
    }
}

/// Fill a nested-call prompt template with the question and any other
/// placeholders, in one pass.
fn fill_prompt(template: &str, question: &str, values: &[(&str, &str)]) -> String {
    let mut all = values.to_vec();
    all.push(("question", question.trim()));
    fill_placeholders(template, &all)
}

/// Split a comma-separated list of material names.
fn split_materials(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|m| m.trim().trim_matches('`').trim().replace("_clean", ""))
        .filter(|m| !m.is_empty())
        .collect()
}
