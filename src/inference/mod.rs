//! Conversion orchestration
//!
//! This module drives a conversion from request to written file:
//! - ConversionRequest: per-call parameters
//! - ArtifactResolver: per-speaker index lookup with model-level fallback
//! - StagedPipeline: features, index refinement, pitch, synthesis
//! - ConversionSession: one loaded model
//! - VoiceConversionEngine: the single-flight owner of all of the above

pub mod artifacts;
mod engine;
pub mod index;
pub mod pipeline;
pub mod pitch;
mod request;
mod session;

pub use artifacts::{list_models, model_base_name, ArtifactPaths, ArtifactResolver};
pub use engine::{EngineComponents, VoiceConversionEngine};
pub use index::{blend, refine, FeatureIndex, IndexLoader};
pub use pipeline::{limit_peak, ConversionPipeline, PipelineJob, StagedPipeline, OUTPUT_PEAK};
pub use pitch::{
    coarse_pitch, resize_curve, shift_pitch, PitchCurve, PitchExtractor, PitchMethod, F0_MAX,
    F0_MIN, PITCH_FRAME_RATE, PITCH_HOP,
};
pub use request::{ConversionRequest, ConversionRequestBuilder};
pub use session::{
    ConversionOutput, ConversionServices, ConversionSession, PreparedCheckpoint, SessionInfo,
};
