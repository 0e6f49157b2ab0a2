//! Events emitted while a run progresses.

use serde::Serialize;
use tokio::sync::mpsc;

/// A structured event emitted by the agent loop or by a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Reasoning the model wrote before acting.
    Thought { content: String },
    /// The agent is invoking a tool.
    ToolCall { tool: String, input: String },
    /// A tool returned (or failed and the failure became text).
    Observation {
        tool: String,
        content: String,
        is_error: bool,
    },
    /// Intermediate output of a tool's own sub-protocol.
    ToolLog {
        tool: String,
        label: String,
        content: String,
    },
    /// A structure image was rendered and should be shown.
    Image { material: String, path: String },
    /// The run produced its answer.
    FinalAnswer { content: String },
    /// Something the user should see but that did not end the run.
    Warning { message: String },
}

impl AgentEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            AgentEvent::Thought { .. } => "thought",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::Observation { .. } => "observation",
            AgentEvent::ToolLog { .. } => "tool_log",
            AgentEvent::Image { .. } => "image",
            AgentEvent::FinalAnswer { .. } => "final_answer",
            AgentEvent::Warning { .. } => "warning",
        }
    }

    /// Human-readable log line, in the marker style the model itself writes.
    pub fn log_line(&self) -> String {
        match self {
            AgentEvent::Thought { content } => format!("Thought: {}", content),
            AgentEvent::ToolCall { tool, input } => {
                format!("Action: {}\nAction Input: {}", tool, input)
            }
            AgentEvent::Observation { content, .. } => format!("Observation: {}", content),
            AgentEvent::ToolLog {
                tool,
                label,
                content,
            } => format!("[{}] {}: {}", tool, label, content),
            AgentEvent::Image { material, path } => {
                format!("[visualizer] Rendered {} to {}", material, path)
            }
            AgentEvent::FinalAnswer { content } => format!("Final Answer: {}", content),
            AgentEvent::Warning { message } => format!("Warning: {}", message),
        }
    }
}

/// Where events go. Cloned into every tool call of a run.
///
/// A sink without a channel drops everything, which is what tests and
/// fire-and-forget callers want.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn noop() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: AgentEvent) {
        tracing::trace!(event = event.event_name(), "Agent event");
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let ev = AgentEvent::ToolCall {
            tool: "predictor".into(),
            input: "surface area of JUKPAI".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["tool"], "predictor");
    }

    #[test]
    fn tool_log_line_names_the_tool() {
        let ev = AgentEvent::ToolLog {
            tool: "visualizer".into(),
            label: "Material".into(),
            content: "XEGKUR".into(),
        };
        assert_eq!(ev.log_line(), "[visualizer] Material: XEGKUR");
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(AgentEvent::Thought {
            content: "a".into(),
        });
        sink.emit(AgentEvent::FinalAnswer {
            content: "b".into(),
        });
        drop(sink);
        assert_eq!(rx.recv().await.unwrap().event_name(), "thought");
        assert_eq!(rx.recv().await.unwrap().event_name(), "final_answer");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn noop_sink_accepts_events() {
        EventSink::noop().emit(AgentEvent::Warning {
            message: "ignored".into(),
        });
    }
}
