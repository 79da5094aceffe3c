//! Model store: registry of loaded models addressed by handle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::loader::{LoadError, ModelLoader};
use super::model::{Model, ModelInfo};
use crate::telemetry;

/// Unique handle to a loaded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Thread-safe registry of loaded models.
///
/// The store holds one strong reference per model. Contexts hold their own,
/// so unloading only releases the weights once the last context is gone.
pub struct ModelStore {
    loader: ModelLoader,
    models: RwLock<HashMap<ModelHandle, Arc<Model>>>,
    next_id: AtomicU64,
}

impl ModelStore {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            loader,
            models: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Map and validate a model file, returning its handle.
    pub fn load(&self, path: &Path) -> Result<ModelHandle, LoadError> {
        let model = Model::load(&self.loader, path)?;
        let size = model.info().size_bytes;

        let handle = ModelHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.models.write().insert(handle, Arc::new(model));

        telemetry::record_model_loaded(size);
        tracing::debug!(%handle, "Model registered");
        Ok(handle)
    }

    /// Drop the store's reference. Returns `false` for an unknown handle.
    pub fn unload(&self, handle: ModelHandle) -> bool {
        let Some(model) = self.models.write().remove(&handle) else {
            tracing::debug!(%handle, "Unload of unknown handle ignored");
            return false;
        };
        // Contexts still holding the model keep it alive.
        let shared_with = Arc::strong_count(&model) - 1;
        telemetry::record_model_unloaded();
        tracing::info!(%handle, contexts = shared_with, "Model unloaded");
        true
    }

    /// Resolve a handle to the shared model; `None` if stale.
    pub fn get(&self, handle: ModelHandle) -> Option<Arc<Model>> {
        self.models.read().get(&handle).cloned()
    }

    pub fn contains(&self, handle: ModelHandle) -> bool {
        self.models.read().contains_key(&handle)
    }

    pub fn info(&self, handle: ModelHandle) -> Option<ModelInfo> {
        self.models.read().get(&handle).map(|m| m.info().clone())
    }

    /// Mapped bytes across all registered models.
    pub fn total_bytes(&self) -> u64 {
        self.models.read().values().map(|m| m.info().size_bytes).sum()
    }

    pub fn count(&self) -> usize {
        self.models.read().len()
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(ModelLoader::default())
    }
}
