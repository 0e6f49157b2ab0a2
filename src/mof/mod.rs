//! Read-only MOF data the tools work on: the lookup table, structure files,
//! property models, and the inference and rendering backends.

mod cif;
mod genetic;
mod inference;
mod models;
mod render;
mod structures;
mod table;

pub use cif::{AtomSite, Crystal, UnitCell};
pub use genetic::{evolve, Candidate, GaConfig, Objective, Surrogate};
pub use inference::{
    CommandBackend, InferenceBackend, InferenceError, Prediction, UnavailableBackend,
};
pub use models::{
    ModelEntry, ModelHparams, ModelStore, PropertyModel, PropertyQuery, PREDICTABLE_PROPERTIES,
};
pub use render::{RenderedImage, StructureRenderer, SvgRenderer};
pub use structures::{StructureFile, StructureStore};
pub use table::{MofRecord, MofTable};

#[cfg(test)]
pub(crate) mod fixtures {
    pub use super::cif::fixtures::SIMPLE_CIF;
    pub use super::models::fixtures::write_model;
    pub use super::table::fixtures::SAMPLE_CSV;
}
