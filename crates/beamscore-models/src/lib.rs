//! Model loading for beamscore.
//!
//! Models are JSON "table" models: a first-order transition table over the
//! target vocabulary, nudged towards tokens present in the source, with a
//! monotone diagonal attention. They implement
//! [`InferencePort`](beamscore_inference::InferencePort) so the engine can
//! run them in an ensemble.

pub mod loader;
pub mod table;

pub use loader::ModelLoader;
pub use table::TableModel;
