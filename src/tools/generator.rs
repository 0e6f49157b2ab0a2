use std::sync::Arc;

use async_trait::async_trait;

use super::{fill_prompt, Tool, ToolContext, ToolError};
use crate::agent::{strip_fences, MarkerScanner};
use crate::llm::LlmClient;
use crate::mof::{evolve, GaConfig, MofTable, Objective, Surrogate};

const NAME: &str = "generator";

const PROMPT: &str = r#"You are an expert in designing metal-organic frameworks.
Read the request and decide which property to optimise and in which direction.

Property must be one of these table columns: {columns}
Objective is maximize, minimize, or a target number.

Use this format:

Question: the input question
Thought: what to generate
Property: the property to optimise
Objective: maximize, minimize, or a number

Begin!

Question: {question}
"#;

/// Proposes new building-block combinations with a genetic algorithm.
pub struct Generator {
    llm: Arc<dyn LlmClient>,
    table: Arc<MofTable>,
    gene_columns: Vec<String>,
    config: GaConfig,
    scanner: MarkerScanner,
}

impl Generator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        table: Arc<MofTable>,
        gene_columns: Vec<String>,
        config: GaConfig,
    ) -> Self {
        Self {
            llm,
            table,
            gene_columns,
            config,
            scanner: MarkerScanner::new(["Question", "Thought", "Property", "Objective"]),
        }
    }
}

#[async_trait]
impl Tool for Generator {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Use this tool to generate new MOFs that maximize, minimize, or reach a target value of a property. Input is the full request in natural language."
    }

    async fn run(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let properties = self.table.numeric_columns().join(", ");
        if properties.is_empty() {
            return Err(ToolError::Execution(
                "the MOF lookup table has no numeric properties to optimise".to_string(),
            ));
        }

        let prompt = fill_prompt(PROMPT, input, &[("columns", properties.as_str())]);
        let completion = self.llm.complete(&prompt, &["Question:".to_string()]).await?;

        let scan = self.scanner.scan(&completion);
        let field = |marker: &str| scan.get(marker).map(strip_fences).filter(|v| !v.is_empty());
        for label in ["Thought", "Property", "Objective"] {
            if let Some(value) = field(label) {
                ctx.log(NAME, label, value);
            }
        }

        let property = field("Property")
            .ok_or_else(|| ToolError::InvalidInput(format!("no Property in: {}", completion.trim())))?;
        let objective: Objective = field("Objective")
            .unwrap_or("maximize")
            .parse()
            .map_err(ToolError::InvalidInput)?;

        let surrogate = Surrogate::fit(&self.table, &self.gene_columns, property)
            .map_err(ToolError::InvalidInput)?;

        let config = self.config.clone();
        let candidates = tokio::task::spawn_blocking(move || evolve(&surrogate, objective, &config))
            .await
            .map_err(|e| ToolError::Execution(format!("generator task failed: {}", e)))?;

        tracing::info!(
            property = %property,
            candidates = candidates.len(),
            "Genetic search finished"
        );

        let mut lines = vec![format!(
            "Top candidates for {} ({}):",
            property,
            self.gene_columns.join(" / ")
        )];
        for (rank, candidate) in candidates.iter().enumerate() {
            lines.push(format!(
                "{}. {} -> predicted {} = {:.4}{}",
                rank + 1,
                candidate.genes.join(" + "),
                property,
                candidate.predicted,
                if candidate.novel { " (new)" } else { "" }
            ));
        }
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::mof::fixtures::SAMPLE_CSV;

    fn generator(reply: &str) -> Generator {
        Generator::new(
            Arc::new(ScriptedLlm::new([reply])),
            Arc::new(MofTable::from_reader(SAMPLE_CSV.as_bytes(), "name").unwrap()),
            vec![
                "topology".to_string(),
                "metal_node".to_string(),
                "organic_linker".to_string(),
            ],
            GaConfig {
                population: 30,
                generations: 8,
                ..GaConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn lists_best_candidates_first() {
        let tool = generator("Thought: high void\nProperty: void_fraction\nObjective: maximize");
        let out = tool.run("generate porous MOFs", &ToolContext::default()).await.unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("Top candidates for void_fraction (topology / metal_node / organic_linker):")
        );
        assert!(lines.next().unwrap().starts_with("1. dia + Zn + BTC -> predicted void_fraction"));
        assert!(out.contains("(new)"));
    }

    #[tokio::test]
    async fn rejects_non_numeric_property() {
        let tool = generator("Property: topology\nObjective: maximize");
        let err = tool.run("q", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_bad_objective() {
        let tool = generator("Property: density\nObjective: sideways");
        let err = tool.run("q", &ToolContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("objective"));
    }
}
