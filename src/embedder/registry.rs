//! Size-one embedder cache
//!
//! Holds at most one loaded embedder. Requests for an alias of the loaded
//! family return the cached instance; any other request loads the new family
//! and replaces the old one. The check and the swap happen under one lock, so
//! two callers needing different embedders cannot interleave.

use candle_core::Tensor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::kind::{EmbedderFamily, EmbedderKind, OutputLayout};
use crate::config::ComputeContext;
use crate::core::error::{Result, VcError};

/// A loaded feature-extraction network
pub trait Embedder: Send + Sync {
    /// Extract content features.
    ///
    /// `audio` is `[1, samples]` at 16 kHz; the result is
    /// `[1, frames, layout.width()]` with one frame per 320 samples.
    fn extract(&self, audio: &Tensor, layout: OutputLayout) -> Result<Tensor>;
}

/// Builds an [`Embedder`] from its weight file.
///
/// The returned network must already be on the context's device, in its
/// dtype, and in inference mode.
pub trait EmbedderLoader: Send + Sync {
    fn load(
        &self,
        family: EmbedderFamily,
        weights: &Path,
        ctx: &ComputeContext,
    ) -> Result<Arc<dyn Embedder>>;
}

/// A loaded embedder, seen through the alias it was requested under
#[derive(Clone)]
pub struct EmbedderHandle {
    kind: EmbedderKind,
    embedder: Arc<dyn Embedder>,
}

impl EmbedderHandle {
    pub fn kind(&self) -> EmbedderKind {
        self.kind
    }

    pub fn layout(&self) -> OutputLayout {
        self.kind.layout()
    }

    /// Extract features using the requested alias's output layout
    pub fn extract(&self, audio: &Tensor) -> Result<Tensor> {
        self.embedder.extract(audio, self.kind.layout())
    }

    /// True when both handles refer to the same loaded network
    pub fn shares_model_with(&self, other: &EmbedderHandle) -> bool {
        Arc::ptr_eq(&self.embedder, &other.embedder)
    }
}

impl std::fmt::Debug for EmbedderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderHandle")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

struct LoadedEmbedder {
    family: EmbedderFamily,
    embedder: Arc<dyn Embedder>,
}

/// Process-wide embedder state as an explicit component
pub struct EmbedderRegistry {
    loader: Arc<dyn EmbedderLoader>,
    models_dir: PathBuf,
    ctx: ComputeContext,
    state: Mutex<Option<LoadedEmbedder>>,
}

impl EmbedderRegistry {
    pub fn new(
        loader: Arc<dyn EmbedderLoader>,
        models_dir: impl Into<PathBuf>,
        ctx: ComputeContext,
    ) -> Self {
        Self {
            loader,
            models_dir: models_dir.into(),
            ctx,
            state: Mutex::new(None),
        }
    }

    /// Make `name` the active embedder, loading it only if its family differs
    pub fn ensure_loaded(&self, name: &str) -> Result<EmbedderHandle> {
        let kind: EmbedderKind = name.parse()?;
        self.ensure_kind(kind)
    }

    /// [`ensure_loaded`](Self::ensure_loaded) for an already-parsed kind
    pub fn ensure_kind(&self, kind: EmbedderKind) -> Result<EmbedderHandle> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| VcError::poisoned("EmbedderRegistry::ensure_kind"))?;

        if let Some(loaded) = state.as_ref() {
            if loaded.family == kind.family() {
                debug!("Embedder {} already loaded as {}", kind, loaded.family);
                return Ok(EmbedderHandle {
                    kind,
                    embedder: Arc::clone(&loaded.embedder),
                });
            }
        }

        let family = kind.family();
        let path = self.weight_path(family);
        info!("Loading embedder {} from {:?}", kind, path);
        let embedder = self
            .loader
            .load(family, &path, &self.ctx)
            .map_err(|e| e.with_path(&path))?;

        // Replacing the slot drops the registry's reference to the old network
        *state = Some(LoadedEmbedder {
            family,
            embedder: Arc::clone(&embedder),
        });
        info!("Embedder {} ready", kind);

        Ok(EmbedderHandle { kind, embedder })
    }

    /// Family currently held, if any
    pub fn loaded_family(&self) -> Result<Option<EmbedderFamily>> {
        let state = self
            .state
            .lock()
            .map_err(|_| VcError::poisoned("EmbedderRegistry::loaded_family"))?;
        Ok(state.as_ref().map(|loaded| loaded.family))
    }

    /// Where the weight file of `family` is expected
    pub fn weight_path(&self, family: EmbedderFamily) -> PathBuf {
        self.models_dir.join(family.weight_file())
    }
}
