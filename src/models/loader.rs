//! Model file access: existence checks, size limits and memory mapping.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

use super::gguf::GgufError;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Model file not found or unreadable: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid model format: {0}")]
    Format(String),

    #[error("Out of memory: model needs {requested} bytes, limit {limit} bytes")]
    OutOfMemory { requested: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<GgufError> for LoadError {
    fn from(e: GgufError) -> Self {
        Self::Format(e.to_string())
    }
}

/// Magic, version and the two counts.
const MIN_MODEL_BYTES: u64 = 24;

/// Opens model files, enforcing the configured size ceiling.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    max_model_bytes: Option<u64>,
}

impl ModelLoader {
    pub fn new(max_model_bytes: Option<u64>) -> Self {
        Self { max_model_bytes }
    }

    /// Memory-map a model file for zero-copy access.
    pub fn open(&self, path: &Path) -> Result<MappedModel, LoadError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                LoadError::FileNotFound(path.to_path_buf())
            }
            _ => LoadError::Io(e),
        })?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(LoadError::FileNotFound(path.to_path_buf()));
        }

        let size = meta.len();
        if size < MIN_MODEL_BYTES {
            return Err(LoadError::Format(format!("file is only {size} bytes")));
        }
        if let Some(limit) = self.max_model_bytes {
            if size > limit {
                return Err(LoadError::OutOfMemory { requested: size, limit });
            }
        }

        MappedModel::open(&file, path, size)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Read-only memory mapping of a model file.
pub struct MappedModel {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedModel {
    fn open(file: &File, path: &Path, size: u64) -> Result<Self, LoadError> {
        // SAFETY: the file is opened read-only and model files are not
        // modified while loaded.
        let mmap = unsafe { Mmap::map(file) }.map_err(|e| match e.kind() {
            io::ErrorKind::OutOfMemory => LoadError::OutOfMemory { requested: size, limit: 0 },
            _ => LoadError::Io(e),
        })?;
        Ok(Self { path: path.to_path_buf(), mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Model data as a byte slice (zero-copy).
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl std::fmt::Debug for MappedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedModel")
            .field("path", &self.path)
            .field("len", &self.mmap.len())
            .finish()
    }
}
