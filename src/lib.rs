//! # ChatMOF
//!
//! A conversational assistant for metal-organic frameworks (MOFs).
//!
//! This library provides:
//! - An HTTP API for asking questions and streaming the agent's progress
//! - A text-protocol agent loop that dispatches to MOF tools
//! - Tools for table lookup, property prediction, structure generation,
//!   visualization, Python execution and arithmetic
//! - An OpenAI chat-completions client and a scripted client for tests
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Render the prompt from the preamble, the question and the scratchpad
//! 2. Ask the LLM for one completion and parse `Action`/`Final Answer`
//! 3. Run the named tool and append its observation
//! 4. Repeat until a final answer or the iteration limit
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chatmof::{agent::{Agent, ActionParser, AgentOptions, EventSink}, config::Config,
//!               llm::ScriptedLlm, tools::ToolResources};
//!
//! let config = Config::from_env()?;
//! let resources = ToolResources::from_config(&config);
//! let llm = Arc::new(ScriptedLlm::new(["Thought: done\nFinal Answer: 42"]));
//! let agent = Agent::new(llm.clone(), ActionParser::new(), resources.build_registry(llm),
//!                        AgentOptions::from(&config.agent));
//! let output = agent.run("What is the density of JUKPAI?", &EventSink::noop()).await?;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod mof;
pub mod tools;

pub use config::Config;
