//! Per-speaker artifact resolution and checkpoint enumeration
//!
//! Layout under `<models>/checkpoints/`:
//!
//! ```text
//! <base>.pth                      checkpoint
//! <base>_index/<base>.<sid>.index per-speaker similarity index
//! <base>_index/<base>.<sid>.big.npy
//! <base>.index                    model-level fallback
//! <base>.big.npy
//! ```

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::error::{Result, VcError};

const INDEX_EXT: &str = "index";
const VECTORS_EXT: &str = "big.npy";

/// Resolved similarity-index and vector-store paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub vectors: PathBuf,
}

impl ArtifactPaths {
    /// Both files are on disk
    pub fn is_complete(&self) -> bool {
        self.index.is_file() && self.vectors.is_file()
    }
}

/// Model base name: file name without its final extension
pub fn model_base_name(model_name: &str) -> &str {
    let file = Path::new(model_name)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(model_name);
    match file.rfind('.') {
        Some(0) | None => file,
        Some(dot) => &file[..dot],
    }
}

/// Resolves artifact paths inside one checkpoints directory
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    checkpoints_dir: PathBuf,
}

impl ArtifactResolver {
    pub fn new(checkpoints_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoints_dir: checkpoints_dir.into(),
        }
    }

    pub fn checkpoints_dir(&self) -> &Path {
        &self.checkpoints_dir
    }

    /// Path of a checkpoint file
    pub fn checkpoint_path(&self, model_name: &str) -> PathBuf {
        self.checkpoints_dir.join(model_name)
    }

    /// Similarity index for `speaker_id`, falling back to the model-level one
    pub fn resolve_index(&self, model_name: &str, speaker_id: u32) -> PathBuf {
        self.resolve(model_name, speaker_id, INDEX_EXT)
    }

    /// Dense vector store for `speaker_id`, falling back to the model-level one
    pub fn resolve_vectors(&self, model_name: &str, speaker_id: u32) -> PathBuf {
        self.resolve(model_name, speaker_id, VECTORS_EXT)
    }

    pub fn resolve_both(&self, model_name: &str, speaker_id: u32) -> ArtifactPaths {
        ArtifactPaths {
            index: self.resolve_index(model_name, speaker_id),
            vectors: self.resolve_vectors(model_name, speaker_id),
        }
    }

    fn resolve(&self, model_name: &str, speaker_id: u32, ext: &str) -> PathBuf {
        let base = model_base_name(model_name);
        let per_speaker = self
            .checkpoints_dir
            .join(format!("{}_index", base))
            .join(format!("{}.{}.{}", base, speaker_id, ext));
        if per_speaker.exists() {
            return per_speaker;
        }
        // Returned even when absent; the pipeline skips refinement then
        let fallback = self.checkpoints_dir.join(format!("{}.{}", base, ext));
        debug!(
            "No per-speaker {} for {} sid {}, using {:?}",
            ext, base, speaker_id, fallback
        );
        fallback
    }
}

/// Checkpoint file names (`.pth` / `.ckpt`) in `<models>/checkpoints`, sorted.
///
/// The directory is created when missing.
pub fn list_models(models_dir: &Path) -> Result<Vec<String>> {
    let dir = models_dir.join("checkpoints");
    std::fs::create_dir_all(&dir).map_err(|e| VcError::Io {
        message: format!("cannot create checkpoints directory: {}", e),
        path: Some(dir.clone()),
    })?;

    let mut models = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.ends_with(".pth") || name.ends_with(".ckpt") {
            models.push(name);
        }
    }
    models.sort();
    Ok(models)
}
