//! Content-feature embedders
//!
//! The embedder networks themselves are external; this module names the
//! supported ones, defines the load/extract contract, and caches the active
//! instance.

mod kind;
mod registry;

pub use kind::{EmbedderFamily, EmbedderKind, OutputLayout};
pub use registry::{Embedder, EmbedderHandle, EmbedderLoader, EmbedderRegistry};

/// Sample rate every embedder consumes
pub const EMBEDDER_SAMPLE_RATE: u32 = 16_000;

/// Input samples per embedder frame
pub const EMBEDDER_HOP: usize = 320;
