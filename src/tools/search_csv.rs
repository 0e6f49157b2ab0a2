use std::sync::Arc;

use async_trait::async_trait;

use super::{fill_prompt, split_materials, Tool, ToolContext, ToolError};
use crate::agent::MarkerScanner;
use crate::llm::LlmClient;
use crate::mof::MofTable;

const NAME: &str = "search_csv";

const TOP_N: usize = 5;

const PROMPT: &str = r#"You are an expert in metal-organic frameworks. You look things up in a table of MOF properties with these columns:
{columns}

Read the question and decide which rows and columns answer it. Use this format:

Question: the input question
Thought: what to look up
Material: comma-separated material names, or none
Column: comma-separated column names from the table, or all
Order: highest, lowest, or none

Begin!

Question: {question}
"#;

/// Looks up tabulated properties in the MOF lookup table.
pub struct SearchCsv {
    llm: Arc<dyn LlmClient>,
    table: Arc<MofTable>,
    scanner: MarkerScanner,
}

impl SearchCsv {
    pub fn new(llm: Arc<dyn LlmClient>, table: Arc<MofTable>) -> Self {
        Self {
            llm,
            table,
            scanner: MarkerScanner::new(["Question", "Thought", "Material", "Column", "Order"]),
        }
    }

    fn columns(&self, value: Option<&str>) -> Result<Vec<String>, ToolError> {
        let Some(value) = value.filter(|v| !v.eq_ignore_ascii_case("all")) else {
            return Ok(Vec::new());
        };
        value
            .split(',')
            .map(|c| c.trim().trim_matches('`').trim())
            .filter(|c| !c.is_empty())
            .map(|c| {
                self.table
                    .column_index(c)
                    .map(|i| self.table.headers()[i].clone())
                    .ok_or_else(|| {
                        ToolError::InvalidInput(format!(
                            "the table has no column '{}'. Available columns: {}",
                            c,
                            self.table.headers().join(", ")
                        ))
                    })
            })
            .collect()
    }

    fn lookup(&self, materials: &[String], columns: &[String]) -> Result<String, ToolError> {
        let selected: Vec<&str> = columns.iter().map(String::as_str).collect();
        let mut lines = Vec::with_capacity(materials.len());
        for material in materials {
            let record = self
                .table
                .find(material)
                .ok_or_else(|| ToolError::MaterialNotFound(material.clone()))?;
            let values = self.table.describe(record, &selected);
            if values.is_empty() {
                lines.push(format!("{}: no tabulated value", record.name));
            } else {
                lines.push(format!("{}: {}", record.name, values));
            }
        }
        Ok(lines.join("\n"))
    }

    fn rank(&self, column: &str, descending: bool) -> Result<String, ToolError> {
        let rows = self.table.ranked(column, descending, TOP_N);
        if rows.is_empty() {
            return Err(ToolError::InvalidInput(format!(
                "column '{}' has no numeric values to order by",
                column
            )));
        }
        let listed = rows
            .iter()
            .map(|(record, value)| format!("{} ({})", record.name, value))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "Materials with the {} {}: {}",
            if descending { "highest" } else { "lowest" },
            column,
            listed
        ))
    }
}

#[async_trait]
impl Tool for SearchCsv {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Use this tool first to look up properties of materials that are already tabulated (surface area, density, pore sizes, topology, metal node, linker). Input is the full question in natural language."
    }

    async fn run(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        if self.table.is_empty() {
            return Err(ToolError::Execution(
                "the MOF lookup table is not loaded".to_string(),
            ));
        }

        let columns_list = self.table.headers().join(", ");
        let prompt = fill_prompt(PROMPT, input, &[("columns", columns_list.as_str())]);
        let completion = self.llm.complete(&prompt, &["Question:".to_string()]).await?;

        let scan = self.scanner.scan(&completion);
        let field = |marker: &str| {
            scan.get(marker)
                .map(crate::agent::strip_fences)
                .filter(|v| !v.is_empty())
        };
        for label in ["Thought", "Material", "Column", "Order"] {
            if let Some(value) = field(label) {
                ctx.log(NAME, label, value);
            }
        }

        let columns = self.columns(field("Column"))?;
        let materials = field("Material")
            .filter(|m| !m.eq_ignore_ascii_case("none"))
            .map(split_materials)
            .unwrap_or_default();

        if !materials.is_empty() {
            return self.lookup(&materials, &columns);
        }

        let order = field("Order").map(str::to_lowercase);
        match (order.as_deref(), columns.as_slice()) {
            (Some("highest"), [column]) => self.rank(column, true),
            (Some("lowest"), [column]) => self.rank(column, false),
            (Some("highest" | "lowest"), _) => Err(ToolError::InvalidInput(
                "ordering needs exactly one column".to_string(),
            )),
            _ => Err(ToolError::InvalidInput(format!(
                "could not tell which materials to look up from: {}",
                completion.trim()
            ))),
        }
    }
}
