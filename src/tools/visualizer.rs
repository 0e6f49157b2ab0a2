use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{fill_prompt, split_materials, Tool, ToolContext, ToolError};
use crate::agent::{strip_fences, AgentEvent, MarkerScanner};
use crate::llm::LlmClient;
use crate::mof::{Crystal, StructureRenderer, StructureStore};

const NAME: &str = "visualizer";

const PROMPT: &str = r#"You are an expert in metal-organic frameworks. Read the question and name the materials whose structure should be shown.

Use this format:

Question: the input question
Thought: which structures to show
Material: comma-separated material names

Begin!

Question: {question}
"#;

/// Renders crystal structures for the user.
pub struct Visualizer {
    llm: Arc<dyn LlmClient>,
    structures: StructureStore,
    renderer: Arc<dyn StructureRenderer>,
    allow_list: Vec<String>,
    output_dir: PathBuf,
    scanner: MarkerScanner,
}

impl Visualizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        structures: StructureStore,
        renderer: Arc<dyn StructureRenderer>,
        allow_list: Vec<String>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            llm,
            structures,
            renderer,
            allow_list,
            output_dir,
            scanner: MarkerScanner::new(["Question", "Thought", "Material"]),
        }
    }

    fn allowed(&self, material: &str) -> bool {
        self.allow_list.iter().any(|m| m == material)
    }

    async fn render(&self, material: &str) -> Result<PathBuf, ToolError> {
        let structure = self
            .structures
            .find(material)
            .ok_or_else(|| ToolError::MaterialNotFound(material.to_string()))?;
        let crystal = Crystal::load(&structure.path)?;
        let image = self.renderer.render(&crystal)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self
            .output_dir
            .join(format!("{}.{}", material, image.extension));
        tokio::fs::write(&path, &image.bytes).await?;

        tracing::info!(material = %material, path = %path.display(), "Rendered structure");
        Ok(path)
    }
}

#[async_trait]
impl Tool for Visualizer {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Use this tool to show the crystal structure of a material. Input is the full request in natural language."
    }

    async fn run(&self, input: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let prompt = fill_prompt(PROMPT, input, &[]);
        let completion = self.llm.complete(&prompt, &["Question:".to_string()]).await?;

        let scan = self.scanner.scan(&completion);
        if let Some(thought) = scan.get("Thought") {
            ctx.log(NAME, "Thought", thought);
        }
        let material = scan
            .get("Material")
            .map(strip_fences)
            .ok_or_else(|| {
                ToolError::InvalidInput(format!("unknown format for LLM: {}", completion.trim()))
            })?;
        ctx.log(NAME, "Material", material);

        let materials = split_materials(material);
        if materials.is_empty() {
            return Err(ToolError::InvalidInput("no material to visualize".to_string()));
        }

        if let Some(blocked) = materials.iter().find(|m| !self.allowed(m)) {
            tracing::warn!(material = %blocked, "Visualizer request outside the allow-list");
            return Err(ToolError::DeploymentRestricted(format!(
                "This deployment does not support the visualizer for {}. Structures available here: {}.",
                blocked,
                self.allow_list.join(", ")
            )));
        }

        for material in &materials {
            let path = self.render(material).await?;
            ctx.emit(AgentEvent::Image {
                material: material.clone(),
                path: path.display().to_string(),
            });
        }

        Ok(format!(
            "The visualizer has successfully visualized the structure {:?}.",
            materials
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EventSink;
    use crate::llm::ScriptedLlm;
    use crate::mof::fixtures::SIMPLE_CIF;
    use crate::mof::SvgRenderer;
    use tempfile::TempDir;

    fn visualizer(dir: &TempDir, reply: &str) -> Visualizer {
        visualizer_with(dir, Arc::new(ScriptedLlm::new([reply])))
    }

    fn visualizer_with(dir: &TempDir, llm: Arc<ScriptedLlm>) -> Visualizer {
        let cifs = dir.path().join("cifs");
        std::fs::create_dir_all(&cifs).unwrap();
        std::fs::write(cifs.join("XEGKUR.cif"), SIMPLE_CIF).unwrap();
        Visualizer::new(
            llm,
            StructureStore::new(&cifs),
            Arc::new(SvgRenderer::default()),
            vec!["JUKPAI".to_string(), "XEGKUR".to_string()],
            dir.path().join("out"),
        )
    }

    #[tokio::test]
    async fn renders_allowed_material() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new(["Thought: show it\nMaterial: XEGKUR_clean"]));
        let tool = visualizer_with(&dir, llm.clone());
        let (sink, mut rx) = EventSink::channel();
        let out = tool.run("show XEGKUR", &ToolContext::new(sink)).await.unwrap();
        assert_eq!(
            out,
            "The visualizer has successfully visualized the structure [\"XEGKUR\"]."
        );
        assert!(dir.path().join("out/XEGKUR.svg").is_file());
        assert_eq!(llm.stops(), vec![vec!["Question:".to_string()]]);

        let mut images = 0;
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Image { material, .. } = event {
                assert_eq!(material, "XEGKUR");
                images += 1;
            }
        }
        assert_eq!(images, 1);
    }

    #[tokio::test]
    async fn material_outside_allow_list_is_restricted() {
        let dir = TempDir::new().unwrap();
        let tool = visualizer(&dir, "Material: XEGKUR, UNKNOWN1");
        let err = tool.run("show", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::DeploymentRestricted(_)));
        // Nothing is rendered when any material is refused.
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn allow_list_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let tool = visualizer(&dir, "Material: xegkur");
        let err = tool.run("show", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::DeploymentRestricted(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn missing_material_field_is_invalid() {
        let dir = TempDir::new().unwrap();
        let tool = visualizer(&dir, "Thought: hmm");
        let err = tool.run("show", &ToolContext::default()).await.unwrap_err();
        assert!(err.to_string().contains("unknown format"));
    }

    #[tokio::test]
    async fn allowed_but_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let tool = visualizer(&dir, "Material: JUKPAI");
        let err = tool.run("show", &ToolContext::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::MaterialNotFound(_)));
    }
}
