//! Per-property prediction models on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Properties with a fine-tuned model.
pub const PREDICTABLE_PROPERTIES: [&str; 20] = [
    "oxygen_diffusivity_dilute_298K",
    "nitrogen_diffusivity_dilute_298K",
    "hydrogen_uptake_100bar_77K",
    "oxygen_uptake_1bar_298K",
    "void_fraction",
    "solvent_removal_stability",
    "CO2_henry_coefficient_298K",
    "accessible_volume_volume_fraction",
    "nitrogen_uptake_1bar_298K",
    "nonaccessible_surface_area",
    "bandgap",
    "accessible_surface_area",
    "largest_cavity_diameter",
    "nonaccessible_volume",
    "density",
    "pore_limiting_diameter",
    "accessible_volume",
    "thermal_stability",
    "hydrogen_diffusivity_dilute_77K",
    "largest_free_pore_diameter",
];

/// What the predictor was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyQuery {
    Model(String),
    /// Report every tabulated value instead.
    Else,
}

impl PropertyQuery {
    pub fn parse(value: &str) -> Result<Self, String> {
        let wanted = value.trim().trim_matches('`').trim();
        if wanted.eq_ignore_ascii_case("else") {
            return Ok(Self::Else);
        }
        PREDICTABLE_PROPERTIES
            .iter()
            .find(|p| p.eq_ignore_ascii_case(wanted))
            .map(|p| Self::Model(p.to_string()))
            .ok_or_else(|| {
                format!(
                    "{} is not a predictable property. Choose one of {}, else",
                    wanted,
                    PREDICTABLE_PROPERTIES.join(", ")
                )
            })
    }
}

/// The `config` section of `hparams.yaml` that inference depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHparams {
    pub seed: i64,
    pub per_gpu_batchsize: usize,
    pub nbr_fea_len: usize,
    pub img_size: usize,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct HparamsFile {
    config: ModelHparams,
}

/// A validated model directory.
#[derive(Debug, Clone)]
pub struct PropertyModel {
    pub property: String,
    pub dir: PathBuf,
    pub checkpoint: PathBuf,
    pub hparams: ModelHparams,
}

/// Catalogue row for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEntry {
    pub property: String,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// Directory of `{property}/` model folders.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Validate and load the model for `property`.
    pub fn load(&self, property: &str) -> Result<PropertyModel, String> {
        let dir = self.root.join(property);
        if !dir.is_dir() {
            return Err(format!("model directory {} does not exist", dir.display()));
        }

        let mut checkpoints = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| format!("reading {}: {}", dir.display(), e))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "ckpt") {
                checkpoints.push(path.to_path_buf());
            }
        }
        let checkpoint = match checkpoints.len() {
            1 => checkpoints.remove(0),
            0 => return Err(format!("no *.ckpt file in {}", dir.display())),
            n => {
                return Err(format!(
                    "expected one *.ckpt file in {}, found {}",
                    dir.display(),
                    n
                ))
            }
        };

        let hparams = read_hparams(&dir.join("hparams.yaml"))?;

        Ok(PropertyModel {
            property: property.to_string(),
            dir,
            checkpoint,
            hparams,
        })
    }

    /// Status of every predictable property.
    pub fn catalog(&self) -> Vec<ModelEntry> {
        PREDICTABLE_PROPERTIES
            .iter()
            .map(|property| match self.load(property) {
                Ok(_) => ModelEntry {
                    property: property.to_string(),
                    ready: true,
                    problem: None,
                },
                Err(problem) => ModelEntry {
                    property: property.to_string(),
                    ready: false,
                    problem: Some(problem),
                },
            })
            .collect()
    }
}

fn read_hparams(path: &Path) -> Result<ModelHparams, String> {
    if !path.exists() {
        return Err(format!("config file {} does not exist", path.display()));
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") => {}
        other => {
            return Err(format!(
                "config file must be *.yaml, not .{}",
                other.unwrap_or("")
            ))
        }
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {}", path.display(), e))?;
    let file: HparamsFile =
        serde_yaml::from_str(&raw).map_err(|e| format!("invalid {}: {}", path.display(), e))?;
    if file.config.per_gpu_batchsize == 0 {
        return Err(format!("per_gpu_batchsize in {} must be positive", path.display()));
    }
    Ok(file.config)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::Path;

    pub const HPARAMS: &str = "\
config:
  seed: 0
  per_gpu_batchsize: 2
  nbr_fea_len: 64
  img_size: 30
  max_epochs: 20
";

    pub fn write_model(root: &Path, property: &str) {
        let dir = root.join(property);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("best.ckpt"), b"weights").unwrap();
        std::fs::write(dir.join("hparams.yaml"), HPARAMS).unwrap();
    }
}
