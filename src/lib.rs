//! # SDKWork-VC - Voice Conversion Orchestration Core
//!
//! Session and pipeline orchestration for retrieval-based voice conversion.
//! The networks (synthesizer, content embedder, pitch extractor, similarity
//! index) are external; this crate loads and adapts checkpoints, keeps one
//! active model and one active embedder, resolves per-speaker index files,
//! sequences the conversion stages and writes numbered output files.
//!
//! ## Features
//!
//! - **Checkpoint adaptation**: `.pth`, `.ckpt` and `.safetensors` checkpoints,
//!   legacy configuration layouts, speaker count taken from the weights
//! - **Embedder registry**: alias-aware, reloads only when the weight file changes
//! - **Index resolution**: per-speaker artifacts with a model-level fallback
//! - **Single-flight engine**: loads and conversions never interleave
//! - **Asset fetching**: concurrent download of pretrained weights
//! - **GPU Acceleration**: CUDA support via Candle (`cuda` feature)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sdkwork_vc::{ConversionRequest, EngineComponents, EngineConfig, VoiceConversionEngine};
//!
//! let components = EngineComponents {
//!     embedder_loader,
//!     synthesizer_factory,
//!     pipeline,
//! };
//! let engine = VoiceConversionEngine::new(EngineConfig::default(), components)?;
//! engine.load_model("singer.pth")?;
//!
//! let request = ConversionRequest::builder("input.wav")
//!     .speaker_id(0)
//!     .f0_up_key(2)
//!     .auto_load_index(true)
//!     .index_rate(0.5)
//!     .build()?;
//! let output = engine.convert(&request)?;
//! ```
//!
//! ## Inspecting a Checkpoint
//!
//! ```rust,ignore
//! use sdkwork_vc::{CheckpointRecord, PreparedCheckpoint};
//!
//! let record = CheckpointRecord::load("models/checkpoints/singer.pth")?;
//! let info = PreparedCheckpoint::prepare("singer.pth", record, false)?.info();
//! println!("{} speakers at {} Hz", info.speaker_count, info.sample_rate);
//! ```

pub mod audio;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod embedder;
pub mod hub;
pub mod inference;
pub mod models;

// Re-exports for convenience
pub use audio::{AudioLoader, OutputWriter};
pub use checkpoint::{normalize, CheckpointParams, CheckpointRecord, RuntimeConfig, WeightMap};
pub use config::{ComputeContext, EngineConfig, Precision};
pub use core::error::{Result, VcError};
pub use embedder::{Embedder, EmbedderHandle, EmbedderKind, EmbedderLoader, EmbedderRegistry};
pub use hub::{AssetCatalogue, AssetFetcher};
pub use inference::{
    ArtifactResolver, ConversionOutput, ConversionPipeline, ConversionRequest, ConversionSession,
    EngineComponents, PitchExtractor, PitchMethod, PreparedCheckpoint, SessionInfo,
    StagedPipeline, VoiceConversionEngine,
};
pub use models::{SynthesizerFactory, SynthesizerVariant, VoiceSynthesizer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
