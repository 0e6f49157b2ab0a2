//! Agent module - the tool-dispatch loop and its text protocol.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build the prompt from the preamble, the question and the scratchpad
//! 2. Ask the LLM for one completion
//! 3. Parse it into either an action or a final answer
//! 4. Run the tool, append the observation, repeat until an answer or the
//!    iteration limit

mod agent_loop;
mod error;
mod events;
mod parser;
mod prompt;
mod transcript;

pub use agent_loop::{Agent, AgentOptions, ParsePolicy, RunOutput};
pub use error::AgentError;
pub use events::{AgentEvent, EventSink};
pub use parser::{
    strip_fences, ActionKind, ActionParser, Field, MarkerScanner, ParseError, ParsedAction, Scan,
};
pub use prompt::{fill_placeholders, PromptTemplate};
pub use transcript::{Transcript, Turn};
