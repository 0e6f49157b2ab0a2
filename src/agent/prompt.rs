//! Prompt templates for the agent.

use crate::tools::ToolRegistry;

use super::transcript::Transcript;

pub const PREFIX: &str = r#"You act like a material scientist answering a question about metal-organic frameworks (MOFs). Answer the following questions as best you can. Do not make up information: when a value is needed, use a tool to find it. You have access to the following tools:"#;

pub const FORMAT_INSTRUCTIONS: &str = r#"You must not use a tool with the same input more than once in a row.
Material names are CoREMOF REFCODEs written in uppercase (e.g. JUKPAI, XEGKUR).

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question"#;

pub const SUFFIX: &str = r#"Begin!

Question: {input}
Thought:{agent_scratchpad}"#;

/// Substitute `{name}` placeholders in a single pass. Inserted values are not
/// scanned again, so text that happens to contain a placeholder stays literal.
pub fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let found = values.iter().find_map(|(key, value)| {
            tail.strip_prefix('{')
                .and_then(|t| t.strip_prefix(*key))
                .and_then(|t| t.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match found {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// The three-part agent preamble.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub prefix: String,
    pub format_instructions: String,
    pub suffix: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            prefix: PREFIX.to_string(),
            format_instructions: FORMAT_INSTRUCTIONS.to_string(),
            suffix: SUFFIX.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Build the full prompt for the next completion.
    pub fn render(&self, tools: &ToolRegistry, transcript: &Transcript) -> String {
        let tool_descriptions = tools
            .list_tools()
            .iter()
            .map(|t| format!("{}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        let tool_names = tools.names().collect::<Vec<_>>().join(", ");

        let format_instructions =
            fill_placeholders(&self.format_instructions, &[("tool_names", tool_names.as_str())]);
        let scratchpad = transcript.scratchpad();
        let suffix = fill_placeholders(
            &self.suffix,
            &[
                ("input", transcript.question()),
                ("agent_scratchpad", scratchpad.as_str()),
            ],
        );

        format!(
            "{prefix}\n\n{tool_descriptions}\n\n{format_instructions}\n\n{suffix}",
            prefix = self.prefix,
            tool_descriptions = tool_descriptions,
            format_instructions = format_instructions,
            suffix = suffix
        )
    }
}
