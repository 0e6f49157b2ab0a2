//! Deterministic scripted LLM for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LlmClient, LlmError};

/// Replays a fixed script of completions in order.
///
/// Every prompt and its stop sequences are recorded so tests can assert on what the agent
/// (or a tool's nested call) actually sent. When the script runs out, the
/// `fallback` completion is returned if one was set, otherwise
/// [`LlmError::Script`].
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    stops: Mutex<Vec<Vec<String>>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
        }
    }

    /// A client that answers every prompt with the same completion.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.into()),
            prompts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
        }
    }

    /// Queue an error to be returned at this point in the script.
    pub fn then_error(self, error: LlmError) -> Self {
        self.lock_script().push_back(Err(error));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stop sequences passed with each call, in call order.
    pub fn stops(&self) -> Vec<Vec<String>> {
        self.stops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str, stop: &[String]) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());
        self.stops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(stop.to_vec());

        match self.lock_script().pop_front() {
            Some(next) => next,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Script(format!("no response left for call {}", self.calls()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_then_fails() {
        let llm = ScriptedLlm::new(["one", "two"]);
        assert_eq!(llm.complete("a", &[]).await.unwrap(), "one");
        assert_eq!(llm.complete("b", &[]).await.unwrap(), "two");
        assert!(matches!(
            llm.complete("c", &[]).await,
            Err(LlmError::Script(_))
        ));
        assert_eq!(llm.prompts(), vec!["a", "b", "c"]);
        assert_eq!(llm.stops(), vec![Vec::<String>::new(); 3]);
    }

    #[tokio::test]
    async fn records_stop_sequences_per_call() {
        let llm = ScriptedLlm::new(["one", "two"]);
        llm.complete("a", &["\nObservation:".to_string()]).await.unwrap();
        llm.complete("b", &[]).await.unwrap();
        assert_eq!(
            llm.stops(),
            vec![vec!["\nObservation:".to_string()], Vec::new()]
        );
    }

    #[tokio::test]
    async fn repeating_never_runs_out() {
        let llm = ScriptedLlm::repeating("again");
        for _ in 0..5 {
            assert_eq!(llm.complete("p", &[]).await.unwrap(), "again");
        }
        assert_eq!(llm.calls(), 5);
    }

    #[tokio::test]
    async fn queued_error_is_returned_in_order() {
        let llm = ScriptedLlm::new(["ok"]).then_error(LlmError::Authentication("bad key".into()));
        assert!(llm.complete("p", &[]).await.is_ok());
        assert!(matches!(
            llm.complete("p", &[]).await,
            Err(LlmError::Authentication(_))
        ));
    }
}
