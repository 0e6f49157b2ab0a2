//! The record of one run.

use serde::Serialize;

use super::parser::{ACTION, ACTION_INPUT, OBSERVATION, THOUGHT};

/// One entry in a [`Transcript`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    UserQuestion { text: String },
    AgentThought { text: String },
    AgentAction { tool: String, input: String },
    ToolObservation { text: String, is_error: bool },
    FinalAnswer { text: String },
}

/// Append-only list of turns for a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::UserQuestion {
                text: question.into(),
            }],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn question(&self) -> &str {
        match self.turns.first() {
            Some(Turn::UserQuestion { text }) => text,
            _ => "",
        }
    }

    /// Number of tool invocations recorded so far.
    pub fn dispatch_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t, Turn::AgentAction { .. }))
            .count()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::FinalAnswer { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Render everything after the question as the scratchpad that follows
    /// the prompt's trailing `Thought:`.
    ///
    /// Each step reads ` <thought>\nAction: ..\nAction Input: ..\nObservation: ..\nThought:`
    /// so the model continues exactly where the next thought belongs.
    pub fn scratchpad(&self) -> String {
        let mut out = String::new();
        let mut at_thought = true;
        for turn in self.turns.iter().skip(1) {
            match turn {
                Turn::UserQuestion { .. } | Turn::FinalAnswer { .. } => {}
                Turn::AgentThought { text } => {
                    if !at_thought {
                        out.push_str(&format!("\n{}:", THOUGHT));
                    }
                    out.push(' ');
                    out.push_str(text);
                    out.push('\n');
                    at_thought = false;
                }
                Turn::AgentAction { tool, input } => {
                    out.push_str(&format!("{}: {}\n{}: {}\n", ACTION, tool, ACTION_INPUT, input));
                    at_thought = false;
                }
                Turn::ToolObservation { text, .. } => {
                    out.push_str(&format!("{}: {}\n{}:", OBSERVATION, text, THOUGHT));
                    at_thought = true;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transcript_holds_question() {
        let t = Transcript::new("What is the surface area of JUKPAI?");
        assert_eq!(t.question(), "What is the surface area of JUKPAI?");
        assert_eq!(t.turns().len(), 1);
        assert_eq!(t.scratchpad(), "");
    }

    #[test]
    fn scratchpad_renders_steps_in_protocol_form() {
        let mut t = Transcript::new("q");
        t.push(Turn::AgentThought {
            text: "look it up".into(),
        });
        t.push(Turn::AgentAction {
            tool: "predictor".into(),
            input: "surface area of JUKPAI".into(),
        });
        t.push(Turn::ToolObservation {
            text: "JUKPAI: 1500".into(),
            is_error: false,
        });
        assert_eq!(
            t.scratchpad(),
            " look it up\nAction: predictor\nAction Input: surface area of JUKPAI\nObservation: JUKPAI: 1500\nThought:"
        );
        assert_eq!(t.dispatch_count(), 1);
    }

    #[test]
    fn action_without_thought_still_renders() {
        let mut t = Transcript::new("q");
        t.push(Turn::AgentAction {
            tool: "search_csv".into(),
            input: "x".into(),
        });
        t.push(Turn::ToolObservation {
            text: "y".into(),
            is_error: true,
        });
        assert_eq!(t.scratchpad(), "Action: search_csv\nAction Input: x\nObservation: y\nThought:");
    }

    #[test]
    fn final_answer_is_found() {
        let mut t = Transcript::new("q");
        assert_eq!(t.final_answer(), None);
        t.push(Turn::FinalAnswer { text: "done".into() });
        assert_eq!(t.final_answer(), Some("done"));
    }
}
