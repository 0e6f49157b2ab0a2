use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Tool, ToolContext, ToolError};
use crate::agent::strip_fences;

const NAME: &str = "python_repl";

/// Observation text is cut beyond this many bytes.
const MAX_OUTPUT: usize = 10_000;

/// Runs Python code in a fresh interpreter.
pub struct PythonRepl {
    python: String,
    timeout: Duration,
}

impl PythonRepl {
    pub fn new(python: String, timeout: Duration) -> Self {
        Self { python, timeout }
    }
}

/// Drop code fences and a leading `python` tag.
fn sanitize(input: &str) -> &str {
    let code = strip_fences(input);
    let code = code
        .strip_prefix("python")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .unwrap_or(code);
    code.trim()
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_OUTPUT {
        let mut end = MAX_OUTPUT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("\n... [output truncated]");
    }
    text
}

#[async_trait]
impl Tool for PythonRepl {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "A Python shell. Use this to execute python commands. Input should be a valid python command. If you want to see the output of a value, you should print it out with `print(...)`."
    }

    async fn run(&self, input: &str, _ctx: &ToolContext) -> Result<String, ToolError> {
        let code = sanitize(input);
        if code.is_empty() {
            return Err(ToolError::InvalidInput("no python code given".to_string()));
        }

        tracing::info!(python = %self.python, bytes = code.len(), "Executing python code");

        let mut child = Command::new(&self.python)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Execution(format!("failed to start {}: {}", self.python, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ToolError::Execution(format!(
                    "python timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(truncate(stdout))
        } else if stderr.trim().is_empty() {
            Ok(truncate(format!("{}\nexit status: {}", stdout, output.status)))
        } else {
            Ok(truncate(format!("{}{}", stdout, stderr)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_fences_and_tag() {
        assert_eq!(sanitize("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(sanitize("`print(2)`"), "print(2)");
        assert_eq!(sanitize("python print(3)"), "print(3)");
        assert_eq!(sanitize("print(4)"), "print(4)");
        assert_eq!(sanitize("pythonic = 5"), "pythonic = 5");
    }

    #[test]
    fn long_output_is_truncated() {
        let out = truncate("x".repeat(MAX_OUTPUT + 10));
        assert!(out.ends_with("[output truncated]"));
        assert!(out.len() < MAX_OUTPUT + 40);
    }

    #[tokio::test]
    async fn empty_code_is_invalid() {
        let repl = PythonRepl::new("python3".into(), Duration::from_secs(5));
        let err = repl.run("```\n```", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_interpreter_is_execution_error() {
        let repl = PythonRepl::new("/nonexistent/python".into(), Duration::from_secs(5));
        let err = repl.run("print(1)", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_code_through_interpreter() {
        // `cat -` stands in for an interpreter: it echoes the program text.
        let repl = PythonRepl::new("cat".into(), Duration::from_secs(5));
        let out = repl
            .run("```python\nprint('hi')\n```", &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out, "print('hi')");
    }
}
