//! Model management: GGUF parsing, memory mapping and the handle registry.

pub mod gguf;
pub mod synth;

mod loader;
mod model;
mod store;

pub use loader::{LoadError, MappedModel, ModelLoader};
pub use model::{Hyperparams, LayerWeights, Model, ModelInfo, ModelWeights};
pub use store::{ModelHandle, ModelStore};
