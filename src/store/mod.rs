//! Per-run shared state: the dataset store and the model registry.

pub mod dataset;
pub mod model;

pub use dataset::DatasetStore;
pub use model::ModelRegistry;
