//! Synthesis network contracts
//!
//! - Variant selection from the checkpoint's pitch flag
//! - The external `VoiceSynthesizer` and its factory
//! - Weight schema migration applied before construction

mod synthesizer;
mod weights;

pub use synthesizer::{PitchConditioning, SynthesizerFactory, SynthesizerVariant, VoiceSynthesizer};
pub use weights::{SchemaReport, WeightSchema, PITCH_EMBEDDING_KEY, TRAINING_ONLY_GROUP};
