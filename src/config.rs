//! Configuration management for ChatMOF.
//!
//! Configuration can be set via environment variables:
//! - `OPENAI_API_KEY` - Optional. Default key used when a request carries none.
//! - `OPENAI_BASE_URL` - Optional. Defaults to `https://api.openai.com/v1`.
//! - `DEFAULT_MODEL` - Optional. `gpt-4`, `gpt-3.5-turbo` or `gpt-3.5-turbo-16k`. Defaults to `gpt-4`.
//! - `DEFAULT_TEMPERATURE` - Optional. Between 0 and 1. Defaults to `0.1`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8501`.
//! - `MAX_ITERATIONS` - Optional. Maximum agent loop iterations. Defaults to `15`.
//! - `PARSE_RETRY` - Optional. Feed parse errors back to the model instead of aborting.
//! - `LLM_TIMEOUT_SECS` / `TOOL_TIMEOUT_SECS` - Optional. Per-call timeouts.
//! - `STRUCTURE_DIR`, `MODEL_DIR`, `DATA_CSV`, `NAME_COLUMN` - Optional. Data locations.
//! - `OUTPUT_DIR` - Optional. Where rendered structures are written.
//! - `QUESTIONS_PATH` - Optional. Example questions, one per line.
//! - `ENABLED_TOOLS` - Optional. Comma-separated tool names. Defaults to all.
//! - `VISUALIZER_ALLOW_LIST` - Optional. Comma-separated materials the visualizer may render.
//! - `PYTHON_BIN`, `PYTHON_TIMEOUT_SECS` - Optional. Interpreter for `python_repl`.
//! - `PREDICT_COMMAND` - Optional. Whitespace-separated command for property inference.
//! - `GA_POPULATION`, `GA_GENERATIONS`, `GA_SEED` - Optional. Generator settings.
//! - `VERBOSE` - Optional. Include tool sub-protocol logs in responses.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::llm::ChatModel;
use crate::mof::GaConfig;
use crate::tools::ToolKind;

/// Materials the hosted visualizer is allowed to render.
pub const DEFAULT_VISUALIZER_ALLOW_LIST: [&str; 7] = [
    "JUKPAI", "XEGKUR", "ROLEC19", "PITPEP", "LITDAV", "TAHYUZ", "MOJJUR",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Fallback key for requests that do not carry one
    pub api_key: Option<String>,

    pub base_url: String,

    pub default_model: ChatModel,

    pub temperature: f32,

    /// HTTP client timeout
    pub timeout: Duration,
}

/// Agent loop configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,

    /// Retry malformed completions with a correction instead of aborting
    pub parse_retry: bool,

    pub llm_timeout: Duration,

    pub tool_timeout: Duration,
}

/// Locations of the read-only MOF data.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Directory of `{NAME}.cif` files
    pub structure_dir: PathBuf,

    /// Directory of `{property}/` model folders
    pub model_dir: PathBuf,

    /// Lookup table CSV
    pub table_path: PathBuf,

    /// Column holding the material name
    pub name_column: String,

    pub questions_path: Option<PathBuf>,
}

/// Per-tool settings.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub enabled: Vec<ToolKind>,

    pub visualizer_allow_list: Vec<String>,

    pub python_bin: String,

    pub python_timeout: Duration,

    pub predict_command: Option<Vec<String>>,

    pub output_dir: PathBuf,

    /// Building-block columns the generator recombines
    pub gene_columns: Vec<String>,

    pub generator: GaConfig,
}

impl ToolSettings {
    fn with_root(root: &Path) -> Self {
        Self {
            enabled: ToolKind::ALL.to_vec(),
            visualizer_allow_list: DEFAULT_VISUALIZER_ALLOW_LIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            python_bin: "python3".to_string(),
            python_timeout: Duration::from_secs(60),
            predict_command: None,
            output_dir: root.join("output"),
            gene_columns: vec![
                "topology".to_string(),
                "metal_node".to_string(),
                "organic_linker".to_string(),
            ],
            generator: GaConfig::default(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: LlmConfig,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    pub agent: AgentConfig,

    pub data: DataConfig,

    pub tools: ToolSettings,

    /// Include tool sub-protocol logs in responses
    pub verbose: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for values that fail to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_root = env_opt("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("database"));
        let mut config = Self::new(&data_root);

        config.openai.api_key = env_opt("OPENAI_API_KEY");
        if let Some(url) = env_opt("OPENAI_BASE_URL") {
            config.openai.base_url = url;
        }
        if let Some(model) = env_parsed::<ChatModel>("DEFAULT_MODEL")? {
            config.openai.default_model = model;
        }
        if let Some(temperature) = env_parsed::<f32>("DEFAULT_TEMPERATURE")? {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(ConfigError::InvalidValue(
                    "DEFAULT_TEMPERATURE".to_string(),
                    format!("{} is outside [0, 1]", temperature),
                ));
            }
            config.openai.temperature = temperature;
        }

        if let Some(host) = env_opt("HOST") {
            config.host = host;
        }
        if let Some(port) = env_parsed("PORT")? {
            config.port = port;
        }

        if let Some(max_iterations) = env_parsed::<usize>("MAX_ITERATIONS")? {
            if max_iterations == 0 {
                return Err(ConfigError::InvalidValue(
                    "MAX_ITERATIONS".to_string(),
                    "must be at least 1".to_string(),
                ));
            }
            config.agent.max_iterations = max_iterations;
        }
        if let Some(retry) = env_bool("PARSE_RETRY")? {
            config.agent.parse_retry = retry;
        }
        if let Some(secs) = env_parsed::<u64>("LLM_TIMEOUT_SECS")? {
            config.agent.llm_timeout = Duration::from_secs(secs);
            config.openai.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parsed::<u64>("TOOL_TIMEOUT_SECS")? {
            config.agent.tool_timeout = Duration::from_secs(secs);
        }

        if let Some(dir) = env_opt("STRUCTURE_DIR") {
            config.data.structure_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_opt("MODEL_DIR") {
            config.data.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_opt("DATA_CSV") {
            config.data.table_path = PathBuf::from(path);
        }
        if let Some(column) = env_opt("NAME_COLUMN") {
            config.data.name_column = column;
        }
        config.data.questions_path = env_opt("QUESTIONS_PATH").map(PathBuf::from);

        if let Some(dir) = env_opt("OUTPUT_DIR") {
            config.tools.output_dir = PathBuf::from(dir);
        }
        if let Some(list) = env_opt("ENABLED_TOOLS") {
            config.tools.enabled = parse_tool_list(&list)
                .map_err(|e| ConfigError::InvalidValue("ENABLED_TOOLS".to_string(), e))?;
        }
        if let Some(list) = env_opt("VISUALIZER_ALLOW_LIST") {
            config.tools.visualizer_allow_list = split_list(&list);
        }
        if let Some(bin) = env_opt("PYTHON_BIN") {
            config.tools.python_bin = bin;
        }
        if let Some(secs) = env_parsed::<u64>("PYTHON_TIMEOUT_SECS")? {
            config.tools.python_timeout = Duration::from_secs(secs);
        }
        config.tools.predict_command = env_opt("PREDICT_COMMAND")
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty());

        if let Some(population) = env_parsed::<usize>("GA_POPULATION")? {
            if population < 2 {
                return Err(ConfigError::InvalidValue(
                    "GA_POPULATION".to_string(),
                    "must be at least 2".to_string(),
                ));
            }
            config.tools.generator.population = population;
        }
        if let Some(generations) = env_parsed("GA_GENERATIONS")? {
            config.tools.generator.generations = generations;
        }
        if let Some(seed) = env_parsed("GA_SEED")? {
            config.tools.generator.seed = seed;
        }

        if let Some(verbose) = env_bool("VERBOSE")? {
            config.verbose = verbose;
        }

        Ok(config)
    }

    /// Create a config rooted at `data_root` with default values (useful for testing).
    pub fn new(data_root: &Path) -> Self {
        Self {
            openai: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                default_model: ChatModel::default(),
                temperature: 0.1,
                timeout: Duration::from_secs(120),
            },
            host: "127.0.0.1".to_string(),
            port: 8501,
            agent: AgentConfig {
                max_iterations: 15,
                parse_retry: false,
                llm_timeout: Duration::from_secs(120),
                tool_timeout: Duration::from_secs(300),
            },
            data: DataConfig {
                structure_dir: data_root.join("structures").join("coremof"),
                model_dir: data_root.join("load_model"),
                table_path: data_root.join("tables").join("coremof.csv"),
                name_column: "name".to_string(),
                questions_path: None,
            },
            tools: ToolSettings::with_root(data_root),
            verbose: true,
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(name)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))
        })
        .transpose()
}

fn env_bool(name: &str) -> Result<Option<bool>, ConfigError> {
    env_opt(name)
        .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue(name.to_string(), e)))
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_tool_list(value: &str) -> Result<Vec<ToolKind>, String> {
    let mut kinds = Vec::new();
    for name in split_list(value) {
        let kind = name.parse::<ToolKind>()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
