use std::sync::Arc;

use async_trait::async_trait;

use super::{fill_prompt, split_materials, Tool, ToolContext, ToolError};
use crate::agent::{strip_fences, MarkerScanner};
use crate::llm::LlmClient;
use crate::mof::{
    InferenceBackend, InferenceError, ModelStore, MofTable, PropertyQuery, StructureFile,
    StructureStore, PREDICTABLE_PROPERTIES,
};

const NAME: &str = "predictor";

const PROMPT: &str = r#"You are an expert in metal-organic frameworks and in machine-learning property prediction.
Read the question and decide which property to predict and for which materials.

Property must be one of: {properties}, else
Use `else` when the question asks for a property not in that list.
Material is a comma-separated list of material names. A name may use * as a wildcard.

Use this format:

Question: the input question
Thought: what to predict
Property: the property name
Material: the material names

Begin!

Question: {question}
"#;

/// Predicts MOF properties with per-property fine-tuned models.
pub struct Predictor {
    llm: Arc<dyn LlmClient>,
    structures: StructureStore,
    models: ModelStore,
    inference: Arc<dyn InferenceBackend>,
    table: Arc<MofTable>,
    scanner: MarkerScanner,
}

impl Predictor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        structures: StructureStore,
        models: ModelStore,
        inference: Arc<dyn InferenceBackend>,
        table: Arc<MofTable>,
    ) -> Self {
        Self {
            llm,
            structures,
            models,
            inference,
            table,
            scanner: MarkerScanner::new(["Question", "Thought", "Property", "Material"]),
        }
    }

    /// Every numeric column of each material's table row.
    fn tabulated(&self, materials: &[String]) -> Result<String, ToolError> {
        let numeric = self.table.numeric_columns();
        let mut lines = Vec::with_capacity(materials.len());
        for material in materials {
            let record = self
                .table
                .find(material)
                .ok_or_else(|| ToolError::MaterialNotFound(material.clone()))?;
            lines.push(format!("{}: {}", record.name, self.table.describe(record, &numeric)));
        }
        Ok(lines.join("\n"))
    }

    async fn predict(&self, property: &str, materials: &[String]) -> Result<String, ToolError> {
        let mut structures: Vec<StructureFile> = Vec::new();
        for material in materials {
            let found = self.structures.resolve(material);
            if found.is_empty() {
                return Err(ToolError::MaterialNotFound(material.clone()));
            }
            for structure in found {
                if !structures.contains(&structure) {
                    structures.push(structure);
                }
            }
        }

        let model = self.models.load(property).map_err(ToolError::ModelConfig)?;

        tracing::info!(
            property = %property,
            structures = structures.len(),
            batch_size = model.hparams.per_gpu_batchsize,
            "Running property prediction"
        );

        let predictions = self
            .inference
            .predict(&model, &structures)
            .await
            .map_err(|e| match e {
                InferenceError::Unavailable(msg) => ToolError::DeploymentRestricted(msg),
                other => ToolError::Execution(other.to_string()),
            })?;

        Ok(predictions
            .iter()
            .map(|p| format!("{}: {} = {}", p.cif_id, property, p.display()))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl Tool for Predictor {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Use this tool to predict a property of a material that is not in the lookup table, using machine-learning models. Input is the full question in natural language."
    }

    async fn run(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let properties = PREDICTABLE_PROPERTIES.join(", ");
        let prompt = fill_prompt(PROMPT, input, &[("properties", properties.as_str())]);
        let completion = self.llm.complete(&prompt, &["Question:".to_string()]).await?;

        let scan = self.scanner.scan(&completion);
        let field = |marker: &str| scan.get(marker).map(strip_fences).filter(|v| !v.is_empty());
        for label in ["Thought", "Property", "Material"] {
            if let Some(value) = field(label) {
                ctx.log(NAME, label, value);
            }
        }

        let property = field("Property")
            .ok_or_else(|| ToolError::InvalidInput(format!("no Property in: {}", completion.trim())))
            .and_then(|p| PropertyQuery::parse(p).map_err(ToolError::InvalidInput))?;
        let materials = field("Material").map(split_materials).unwrap_or_default();
        if materials.is_empty() {
            return Err(ToolError::InvalidInput(format!(
                "no Material in: {}",
                completion.trim()
            )));
        }

        match property {
            PropertyQuery::Else => self.tabulated(&materials),
            PropertyQuery::Model(property) => self.predict(&property, &materials).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::mof::fixtures::{write_model, SAMPLE_CSV};
    use crate::mof::{Prediction, PropertyModel, UnavailableBackend};
    use tempfile::TempDir;

    struct FixedBackend;

    #[async_trait]
    impl InferenceBackend for FixedBackend {
        async fn predict(
            &self,
            _model: &PropertyModel,
            structures: &[StructureFile],
        ) -> Result<Vec<Prediction>, InferenceError> {
            Ok(structures
                .iter()
                .map(|s| Prediction {
                    cif_id: s.name.clone(),
                    values: vec![1.25],
                })
                .collect())
        }
    }

    struct Fixture {
        _dir: TempDir,
        structures: StructureStore,
        models: ModelStore,
        table: Arc<MofTable>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let cifs = dir.path().join("cifs");
        std::fs::create_dir_all(&cifs).unwrap();
        for name in ["JUKPAI", "JUKPAI01", "XEGKUR"] {
            std::fs::write(cifs.join(format!("{}.cif", name)), "data_x\n").unwrap();
        }
        let models = dir.path().join("models");
        write_model(&models, "density");
        Fixture {
            structures: StructureStore::new(&cifs),
            models: ModelStore::new(&models),
            table: Arc::new(MofTable::from_reader(SAMPLE_CSV.as_bytes(), "name").unwrap()),
            _dir: dir,
        }
    }

    fn predictor(f: &Fixture, reply: &str, backend: Arc<dyn InferenceBackend>) -> Predictor {
        Predictor::new(
            Arc::new(ScriptedLlm::new([reply])),
            f.structures.clone(),
            f.models.clone(),
            backend,
            f.table.clone(),
        )
    }

    #[tokio::test]
    async fn predicts_for_glob_and_exact_names() {
        let f = fixture();
        let tool = predictor(
            &f,
            "Thought: predict density\nProperty: density\nMaterial: JUKPAI*, XEGKUR",
            Arc::new(FixedBackend),
        );
        let out = tool.run("density of JUKPAI?", &ToolContext::default()).await.unwrap();
        assert_eq!(
            out,
            "JUKPAI: density = 1.2500\nJUKPAI01: density = 1.2500\nXEGKUR: density = 1.2500"
        );
    }

    #[tokio::test]
    async fn else_reports_tabulated_values() {
        let f = fixture();
        let tool = predictor(&f, "Property: else\nMaterial: XEGKUR_clean", Arc::new(FixedBackend));
        let out = tool.run("q", &ToolContext::default()).await.unwrap();
        assert_eq!(
            out,
            "XEGKUR_clean: accessible_surface_area=820.0, density=1.21, void_fraction=0.48"
        );
    }

    #[tokio::test]
    async fn missing_structure_is_material_not_found() {
        let f = fixture();
        let tool = predictor(&f, "Property: density\nMaterial: UNKNOWN1", Arc::new(FixedBackend));
        let err = tool.run("q", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::MaterialNotFound(m) if m == "UNKNOWN1"));
    }

    #[tokio::test]
    async fn missing_model_is_a_config_error() {
        let f = fixture();
        let tool = predictor(&f, "Property: bandgap\nMaterial: JUKPAI", Arc::new(FixedBackend));
        let err = tool.run("q", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::ModelConfig(_)));
    }

    #[tokio::test]
    async fn unknown_property_is_invalid_input() {
        let f = fixture();
        let tool = predictor(&f, "Property: colour\nMaterial: JUKPAI", Arc::new(FixedBackend));
        let err = tool.run("q", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unavailable_inference_is_restricted() {
        let f = fixture();
        let tool = predictor(&f, "Property: density\nMaterial: JUKPAI", Arc::new(UnavailableBackend));
        let err = tool.run("q", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::DeploymentRestricted(_)));
    }
}
