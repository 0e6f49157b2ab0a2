use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};

use super::{fill_prompt, Tool, ToolContext, ToolError};
use crate::llm::LlmClient;

const NAME: &str = "llm-math";

const PROMPT: &str = r#"Translate a math problem into a single-line expression that a calculator can evaluate.
You may use + - * / ** ( ) and the functions sqrt, exp, log, log10, sin, cos, tan and the constant pi.

Question: ${Question with math problem.}
```text
${single line mathematical expression that solves the problem}
```
...evaluate...
```output
${Output of running the expression}
```
Answer: ${Answer}

Begin.

Question: What is 37593 * 67?
```text
37593 * 67
```
...evaluate...
```output
2518731
```
Answer: 2518731

Question: {question}
"#;

static TEXT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```text\s*(.*?)```").unwrap());
static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)(\.\d+)?([eE][-+]?\d+)?\b").unwrap());
static FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:math::|math\.)?\b(sqrt|exp|log10|log|ln|sin|cos|tan)\s*\(").unwrap()
});
static PI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:math\.)?\bpi\b").unwrap());

/// Answers arithmetic questions through a translated expression.
pub struct LlmMath {
    llm: Arc<dyn LlmClient>,
}

impl LlmMath {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

/// Rewrite a Python-style expression into evalexpr syntax.
fn translate(expression: &str) -> String {
    let expr = expression.trim().replace("**", "^");
    // Integer literals become floats so `/` is true division.
    let expr = INTEGER.replace_all(&expr, |c: &Captures| {
        if c.get(2).is_some() || c.get(3).is_some() {
            c[0].to_string()
        } else {
            format!("{}.0", &c[1])
        }
    });
    let expr = PI.replace_all(&expr, "3.141592653589793");
    FUNCTION
        .replace_all(&expr, |c: &Captures| match &c[1] {
            "log" | "ln" => "math::ln(".to_string(),
            other => format!("math::{}(", other),
        })
        .into_owned()
}

fn evaluate(expression: &str) -> Result<f64, ToolError> {
    let translated = translate(expression);
    evalexpr::eval(&translated)
        .and_then(|value| value.as_number())
        .map_err(|e| {
            ToolError::InvalidInput(format!(
                "could not evaluate \"{}\": {}. Please try again with a valid numerical expression",
                expression.trim(),
                e
            ))
        })
}

#[async_trait]
impl Tool for LlmMath {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Useful for when you need to answer questions about math."
    }

    async fn run(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let prompt = fill_prompt(PROMPT, input, &[]);
        let completion = self
            .llm
            .complete(&prompt, &["```output".to_string()])
            .await?;
        let completion = completion.trim();

        if let Some(captures) = TEXT_BLOCK.captures(completion) {
            let expression = captures[1].trim();
            ctx.log(NAME, "Expression", expression);
            let value = evaluate(expression)?;
            return Ok(format!("Answer: {}", value));
        }

        if let Some(idx) = completion.find("Answer:") {
            return Ok(completion[idx..].trim().to_string());
        }

        Err(ToolError::InvalidInput(format!(
            "unknown format from LLM: {}",
            completion
        )))
    }
}
