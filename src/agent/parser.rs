//! Text-protocol parsing for model completions.
//!
//! The model answers in a line-oriented protocol:
//!
//! ```text
//! Thought: I need the surface area
//! Action: predictor
//! Action Input: surface area of JUKPAI
//! ```
//!
//! or, once it is done:
//!
//! ```text
//! Thought: I now know the final answer
//! Final Answer: The surface area is 1500 m^2/g.
//! ```
//!
//! [`MarkerScanner`] implements the grammar shared by the agent and the
//! tools: a marker is one of an ordered keyword list, appearing at the start
//! of a line and followed by `:`. Its value runs up to the next marker line or
//! the end of the text. [`ActionParser`] applies agent-level rules on top.

use thiserror::Error;

use crate::tools::ToolRegistry;

pub const QUESTION: &str = "Question";
pub const THOUGHT: &str = "Thought";
pub const ACTION: &str = "Action";
pub const ACTION_INPUT: &str = "Action Input";
pub const OBSERVATION: &str = "Observation";
pub const FINAL_ANSWER: &str = "Final Answer";

/// One marker occurrence found by [`MarkerScanner::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<'t> {
    /// The keyword, as registered with the scanner.
    pub marker: &'t str,
    /// Trimmed text up to the next marker line.
    pub value: &'t str,
    /// Byte offset where the marker line starts.
    pub line_start: usize,
    /// Byte offset just past the `:`.
    pub value_start: usize,
}

/// Result of scanning a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan<'t> {
    /// Text before the first marker line, trimmed.
    pub preamble: &'t str,
    pub fields: Vec<Field<'t>>,
}

impl<'t> Scan<'t> {
    /// First value for `marker`.
    pub fn get(&self, marker: &str) -> Option<&'t str> {
        self.fields
            .iter()
            .find(|f| f.marker == marker)
            .map(|f| f.value)
    }

    pub fn count(&self, marker: &str) -> usize {
        self.fields.iter().filter(|f| f.marker == marker).count()
    }

    fn position(&self, marker: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.marker == marker)
    }
}

/// Splits text into marker-introduced fields.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    /// Longest first, so `Action Input` is tried before `Action`.
    markers: Vec<String>,
}

impl MarkerScanner {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut markers: Vec<String> = markers.into_iter().map(Into::into).collect();
        markers.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        markers.dedup();
        Self { markers }
    }

    pub fn markers(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(String::as_str)
    }

    pub fn scan<'t>(&'t self, text: &'t str) -> Scan<'t> {
        // (marker, line_start, value_start)
        let mut hits: Vec<(&'t str, usize, usize)> = Vec::new();
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let indent = line.len() - line.trim_start().len();
            let rest = &line[indent..];
            if let Some(marker) = self.marker_at(rest) {
                hits.push((marker, offset, offset + indent + marker.len() + 1));
            }
            offset += line.len();
        }

        let preamble_end = hits.first().map(|h| h.1).unwrap_or(text.len());
        let fields = hits
            .iter()
            .enumerate()
            .map(|(i, &(marker, line_start, value_start))| {
                let end = hits.get(i + 1).map(|h| h.1).unwrap_or(text.len());
                Field {
                    marker,
                    value: text[value_start..end].trim(),
                    line_start,
                    value_start,
                }
            })
            .collect();

        Scan {
            preamble: text[..preamble_end].trim(),
            fields,
        }
    }

    /// Value of the first `marker` field, with surrounding code fences or
    /// backticks removed.
    pub fn extract<'t>(&'t self, text: &'t str, marker: &str) -> Option<&'t str> {
        self.scan(text).get(marker).map(strip_fences)
    }

    fn marker_at<'t>(&'t self, rest: &str) -> Option<&'t str> {
        self.markers
            .iter()
            .find(|m| rest.starts_with(m.as_str()) && rest[m.len()..].starts_with(':'))
            .map(String::as_str)
    }
}

/// Strip a surrounding ```` ``` ```` fence (with optional language tag) or
/// single backticks.
pub fn strip_fences(value: &str) -> &str {
    let mut v = value.trim();
    if let Some(inner) = v.strip_prefix("```") {
        let inner = inner.strip_suffix("```").unwrap_or(inner);
        // A language tag sits on the opening line only when more lines follow.
        v = match inner.split_once('\n') {
            Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                if body.trim().is_empty() {
                    tag
                } else {
                    body
                }
            }
            _ => inner,
        };
    } else if let Some(inner) = v.strip_prefix('`') {
        v = inner.strip_suffix('`').unwrap_or(inner);
    }
    v.trim()
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Action { tool: String, input: String },
    FinalAnswer(String),
}

/// One parsed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub thought: Option<String>,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("could not parse LLM output ({reason}): `{completion}`")]
    Malformed { reason: String, completion: String },

    #[error("{0} is not a valid tool")]
    UnknownTool(String),
}

impl ParseError {
    fn malformed(reason: impl Into<String>, completion: &str) -> Self {
        ParseError::Malformed {
            reason: reason.into(),
            completion: completion.to_string(),
        }
    }
}

/// Parses agent completions into [`ParsedAction`]s.
#[derive(Debug, Clone)]
pub struct ActionParser {
    scanner: MarkerScanner,
}

impl Default for ActionParser {
    fn default() -> Self {
        Self {
            scanner: MarkerScanner::new([
                QUESTION,
                THOUGHT,
                ACTION,
                ACTION_INPUT,
                OBSERVATION,
                FINAL_ANSWER,
            ]),
        }
    }
}

impl ActionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop sequences that keep the model from writing the next turn itself.
    pub fn stop_sequences(&self) -> Vec<String> {
        vec![
            format!("\n{}:", OBSERVATION),
            format!("\n\t{}:", OBSERVATION),
            format!("\n{}:", QUESTION),
        ]
    }

    pub fn parse(&self, text: &str, tools: &ToolRegistry) -> Result<ParsedAction, ParseError> {
        let scan = self.scanner.scan(text);

        let thought = scan
            .get(THOUGHT)
            .or(Some(scan.preamble))
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        if let Some(final_idx) = scan.position(FINAL_ANSWER) {
            if scan.fields[..final_idx].iter().any(|f| f.marker == ACTION) {
                return Err(ParseError::malformed(
                    "both an action and a final answer",
                    text,
                ));
            }
            if scan.count(FINAL_ANSWER) > 1 {
                return Err(ParseError::malformed("duplicated 'Final Answer:'", text));
            }
            let answer = text[scan.fields[final_idx].value_start..].trim();
            if answer.is_empty() {
                return Err(ParseError::malformed("empty final answer", text));
            }
            return Ok(ParsedAction {
                thought,
                kind: ActionKind::FinalAnswer(answer.to_string()),
            });
        }

        match (scan.count(ACTION), scan.count(ACTION_INPUT)) {
            (0, 0) => {
                return Err(ParseError::malformed(
                    "missing 'Action:' or 'Final Answer:'",
                    text,
                ))
            }
            (1, 1) => {}
            (0, _) => return Err(ParseError::malformed("missing 'Action:'", text)),
            (_, 0) => {
                return Err(ParseError::malformed(
                    "missing 'Action Input:' after 'Action:'",
                    text,
                ))
            }
            _ => return Err(ParseError::malformed("duplicated action markers", text)),
        }

        let (action_idx, input_idx) = match (scan.position(ACTION), scan.position(ACTION_INPUT)) {
            (Some(a), Some(i)) => (a, i),
            _ => return Err(ParseError::malformed("missing action markers", text)),
        };
        if input_idx < action_idx {
            return Err(ParseError::malformed(
                "'Action Input:' appears before 'Action:'",
                text,
            ));
        }

        let tool = scan.fields[action_idx].value;
        if tool.is_empty() {
            return Err(ParseError::malformed("empty action name", text));
        }
        if !tools.contains(tool) {
            return Err(ParseError::UnknownTool(tool.to_string()));
        }

        Ok(ParsedAction {
            thought,
            kind: ActionKind::Action {
                tool: tool.to_string(),
                input: scan.fields[input_idx].value.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::EchoTool;
    use std::sync::Arc;

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool::named("predictor")));
        tools.register(Arc::new(EchoTool::named("search_csv")));
        tools
    }

    fn parse(text: &str) -> Result<ParsedAction, ParseError> {
        ActionParser::new().parse(text, &registry())
    }

    #[test]
    fn final_answer_is_text_after_marker() {
        let parsed = parse("Thought: I now know\nFinal Answer:  The surface area is 1500 m^2/g. \n")
            .unwrap();
        assert_eq!(parsed.thought.as_deref(), Some("I now know"));
        assert_eq!(
            parsed.kind,
            ActionKind::FinalAnswer("The surface area is 1500 m^2/g.".into())
        );
    }

    #[test]
    fn final_answer_keeps_later_marker_lines() {
        let parsed = parse("Final Answer: first\nObservation: not a real one").unwrap();
        assert_eq!(
            parsed.kind,
            ActionKind::FinalAnswer("first\nObservation: not a real one".into())
        );
    }

    #[test]
    fn action_and_input_are_trimmed() {
        let parsed =
            parse("Thought: look it up\nAction:   predictor  \nAction Input:  surface area of JUKPAI \n")
                .unwrap();
        assert_eq!(
            parsed.kind,
            ActionKind::Action {
                tool: "predictor".into(),
                input: "surface area of JUKPAI".into(),
            }
        );
    }

    #[test]
    fn preamble_counts_as_thought() {
        let parsed = parse(" I should search the table\nAction: search_csv\nAction Input: JUKPAI").unwrap();
        assert_eq!(parsed.thought.as_deref(), Some("I should search the table"));
    }

    #[test]
    fn no_thought_is_fine() {
        let parsed = parse("Action: predictor\nAction Input: x").unwrap();
        assert_eq!(parsed.thought, None);
    }

    #[test]
    fn multi_line_action_input_runs_to_end() {
        let parsed = parse("Action: predictor\nAction Input: line one\nline two").unwrap();
        match parsed.kind {
            ActionKind::Action { input, .. } => assert_eq!(input, "line one\nline two"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn action_input_stops_at_observation() {
        let parsed = parse("Action: predictor\nAction Input: x\nObservation: hallucinated").unwrap();
        match parsed.kind {
            ActionKind::Action { input, .. } => assert_eq!(input, "x"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let err = parse("Action: Predictor\nAction Input: x").unwrap_err();
        assert_eq!(err, ParseError::UnknownTool("Predictor".into()));
    }

    #[test]
    fn missing_markers_is_malformed() {
        let err = parse("The answer is probably 42.").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn action_without_input_is_malformed() {
        assert!(matches!(
            parse("Action: predictor\n").unwrap_err(),
            ParseError::Malformed { .. }
        ));
    }

    #[test]
    fn duplicated_action_is_malformed() {
        let err = parse("Action: predictor\nAction Input: a\nAction: search_csv\nAction Input: b")
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed { ref reason, .. } if reason.contains("duplicated")));
    }

    #[test]
    fn duplicated_final_answer_is_malformed() {
        let err = parse("Final Answer: a\nFinal Answer: b").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Malformed { ref reason, .. } if reason == "duplicated 'Final Answer:'"
        ));
    }

    #[test]
    fn input_before_action_is_malformed() {
        assert!(matches!(
            parse("Action Input: a\nAction: predictor").unwrap_err(),
            ParseError::Malformed { .. }
        ));
    }

    #[test]
    fn action_then_final_answer_is_ambiguous() {
        let err = parse("Action: predictor\nAction Input: a\nFinal Answer: b").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { ref reason, .. } if reason.contains("both")));
    }

    #[test]
    fn empty_final_answer_is_malformed() {
        assert!(matches!(
            parse("Final Answer:   \n").unwrap_err(),
            ParseError::Malformed { .. }
        ));
    }

    #[test]
    fn markers_must_start_a_line() {
        let err = parse("I will use Action: predictor now").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn indented_markers_are_recognised() {
        let parsed = parse("  Action: predictor\n\tAction Input: x").unwrap();
        assert!(matches!(parsed.kind, ActionKind::Action { .. }));
    }

    #[test]
    fn stop_sequences_cover_next_turn() {
        let stops = ActionParser::new().stop_sequences();
        assert!(stops.contains(&"\nObservation:".to_string()));
        assert!(stops.contains(&"\nQuestion:".to_string()));
    }

    #[test]
    fn scanner_prefers_longest_marker() {
        let scanner = MarkerScanner::new(["Thought", "Final Thought"]);
        let scan = scanner.scan("Final Thought: done\nThought: go");
        assert_eq!(scan.get("Final Thought"), Some("done"));
        assert_eq!(scan.get("Thought"), Some("go"));
    }

    #[test]
    fn scanner_extracts_fenced_material() {
        let scanner = MarkerScanner::new(["Thought", "Material", "Question"]);
        let text = "Thought: need a picture\nMaterial: ```XEGKUR```\nQuestion: next";
        assert_eq!(scanner.extract(text, "Material"), Some("XEGKUR"));
        assert_eq!(scanner.extract(text, "Thought"), Some("need a picture"));
        assert_eq!(scanner.extract(text, "Missing"), None);
    }

    #[test]
    fn strip_fences_handles_language_tag() {
        assert_eq!(strip_fences("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_fences("`JUKPAI`"), "JUKPAI");
        assert_eq!(strip_fences("plain"), "plain");
    }
}
