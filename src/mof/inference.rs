//! Property inference behind an opaque backend.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

use super::models::PropertyModel;
use super::structures::StructureFile;

#[derive(Debug, Error)]
pub enum InferenceError {
    /// No inference service in this deployment.
    #[error("{0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Failed(String),

    #[error("unreadable inference output: {0}")]
    Output(String),
}

/// Predicted value(s) for one structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub cif_id: String,
    pub values: Vec<f64>,
}

impl Prediction {
    /// Values rendered for the observation text.
    pub fn display(&self) -> String {
        match self.values.as_slice() {
            [single] => format!("{:.4}", single),
            many => format!(
                "[{}]",
                many.iter()
                    .map(|v| format!("{:.4}", v))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Predict `model.property` for every structure.
    async fn predict(
        &self,
        model: &PropertyModel,
        structures: &[StructureFile],
    ) -> Result<Vec<Prediction>, InferenceError>;
}

/// Backend for deployments without machine-learning inference.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

#[async_trait]
impl InferenceBackend for UnavailableBackend {
    async fn predict(
        &self,
        model: &PropertyModel,
        _structures: &[StructureFile],
    ) -> Result<Vec<Prediction>, InferenceError> {
        Err(InferenceError::Unavailable(format!(
            "Predicting {} needs the machine-learning predictor, which is not available in this deployment.",
            model.property
        )))
    }
}

/// Runs an external predictor once per batch.
///
/// Invoked as `<command> --checkpoint <ckpt> --hparams <yaml> --batch-size <n> -- <cif>...`.
/// The command prints a JSON object of parallel arrays: `cif_id` and one
/// array of predictions (a `*logits` key is preferred).
#[derive(Debug, Clone)]
pub struct CommandBackend {
    argv: Vec<String>,
}

impl CommandBackend {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    async fn run_batch(
        &self,
        model: &PropertyModel,
        batch: &[StructureFile],
    ) -> Result<Vec<Prediction>, InferenceError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| InferenceError::Unavailable("no predictor command configured".into()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .arg("--checkpoint")
            .arg(&model.checkpoint)
            .arg("--hparams")
            .arg(model.dir.join("hparams.yaml"))
            .arg("--batch-size")
            .arg(model.hparams.per_gpu_batchsize.to_string())
            .arg("--")
            .args(batch.iter().map(|s| &s.path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            property = %model.property,
            batch = batch.len(),
            "Running predictor command: {}",
            program
        );

        let output = command
            .output()
            .await
            .map_err(|e| InferenceError::Failed(format!("failed to start {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InferenceError::Failed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&output.stdout)
    }
}

#[async_trait]
impl InferenceBackend for CommandBackend {
    async fn predict(
        &self,
        model: &PropertyModel,
        structures: &[StructureFile],
    ) -> Result<Vec<Prediction>, InferenceError> {
        let batch_size = model.hparams.per_gpu_batchsize.max(1);
        let mut predictions = Vec::with_capacity(structures.len());
        for batch in structures.chunks(batch_size) {
            predictions.extend(self.run_batch(model, batch).await?);
        }
        Ok(predictions)
    }
}

fn parse_output(stdout: &[u8]) -> Result<Vec<Prediction>, InferenceError> {
    let value: Value =
        serde_json::from_slice(stdout).map_err(|e| InferenceError::Output(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| InferenceError::Output("expected a JSON object".into()))?;

    let ids = object
        .get("cif_id")
        .and_then(Value::as_array)
        .ok_or_else(|| InferenceError::Output("missing cif_id array".into()))?;

    let key = object
        .keys()
        .find(|k| k.ends_with("logits"))
        .or_else(|| object.keys().find(|k| *k != "cif_id"))
        .ok_or_else(|| InferenceError::Output("no prediction array".into()))?;
    let values = object[key]
        .as_array()
        .ok_or_else(|| InferenceError::Output(format!("{} is not an array", key)))?;

    if ids.len() != values.len() {
        return Err(InferenceError::Output(format!(
            "cif_id has {} entries but {} has {}",
            ids.len(),
            key,
            values.len()
        )));
    }

    ids.iter()
        .zip(values)
        .map(|(id, value)| {
            let cif_id = id
                .as_str()
                .ok_or_else(|| InferenceError::Output("cif_id entries must be strings".into()))?
                .to_string();
            let values = match value {
                Value::Number(n) => n.as_f64().into_iter().collect(),
                Value::Array(items) => items.iter().filter_map(Value::as_f64).collect(),
                _ => Vec::new(),
            };
            if values.is_empty() {
                return Err(InferenceError::Output(format!("no numeric value for {}", cif_id)));
            }
            Ok(Prediction { cif_id, values })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mof::models::fixtures::write_model;
    use crate::mof::ModelStore;
    use tempfile::TempDir;

    #[test]
    fn parses_scalar_and_vector_predictions() {
        let out = br#"{"cif_id":["A","B"],"regression_logits":[1.5,[0.1,0.9]]}"#;
        let predictions = parse_output(out).unwrap();
        assert_eq!(predictions[0].display(), "1.5000");
        assert_eq!(predictions[1].values, vec![0.1, 0.9]);
        assert_eq!(predictions[1].display(), "[0.1000, 0.9000]");
    }

    #[test]
    fn rejects_mismatched_arrays() {
        let out = br#"{"cif_id":["A","B"],"logits":[1.0]}"#;
        assert!(matches!(parse_output(out), Err(InferenceError::Output(_))));
        assert!(parse_output(b"not json").is_err());
    }

    #[tokio::test]
    async fn unavailable_backend_reports_restriction() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "density");
        let model = ModelStore::new(dir.path()).load("density").unwrap();
        let err = UnavailableBackend.predict(&model, &[]).await.unwrap_err();
        assert!(matches!(err, InferenceError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_backend_batches_structures() {
        const SCRIPT: &str = r#"
ids=""; vals=""; seen=0
for a in "$@"; do
  if [ "$seen" = 1 ]; then
    n=$(basename "$a" .cif)
    ids="$ids${ids:+,}\"$n\""
    vals="$vals${vals:+,}0.5"
  fi
  [ "$a" = "--" ] && seen=1
done
echo "batch" >> "$CALLS_FILE"
printf '{"cif_id":[%s],"regression_logits":[%s]}' "$ids" "$vals"
"#;
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "density");
        let model = ModelStore::new(dir.path()).load("density").unwrap();
        let calls = dir.path().join("calls.txt");

        let structures: Vec<StructureFile> = ["A", "B", "C"]
            .iter()
            .map(|n| StructureFile {
                name: n.to_string(),
                path: dir.path().join(format!("{}.cif", n)),
            })
            .collect();

        let backend = CommandBackend::new(vec![
            "sh".into(),
            "-c".into(),
            format!("CALLS_FILE='{}'\n{}", calls.display(), SCRIPT),
            "predict".into(),
        ]);
        let predictions = backend.predict(&model, &structures).await.unwrap();

        let ids: Vec<_> = predictions.iter().map(|p| p.cif_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        let batches = std::fs::read_to_string(&calls).unwrap();
        assert_eq!(batches.lines().count(), 2);
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "density");
        let model = ModelStore::new(dir.path()).load("density").unwrap();
        let backend = CommandBackend::new(vec!["/nonexistent/predictor".into()]);
        let structure = StructureFile {
            name: "A".into(),
            path: dir.path().join("A.cif"),
        };
        let err = backend.predict(&model, &[structure]).await.unwrap_err();
        assert!(matches!(err, InferenceError::Failed(_)));
    }
}
