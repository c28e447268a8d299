//! Synthesizer contract
//!
//! The synthesis network is external. It comes in two variants selected by the
//! checkpoint's pitch flag; the pitch-aware one takes an extra conditioning
//! input at inference.

use candle_core::Tensor;
use serde::Serialize;
use std::fmt;

use crate::checkpoint::{RuntimeConfig, WeightMap};
use crate::config::ComputeContext;
use crate::core::error::Result;

/// Network variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesizerVariant {
    /// Conditioned on a pitch contour
    PitchAware,
    /// Content and speaker only
    PitchUnaware,
}

impl SynthesizerVariant {
    /// Variant for a stored pitch flag (`1` = pitch-aware)
    pub fn from_f0_flag(f0: i64) -> Self {
        if f0 == 1 {
            SynthesizerVariant::PitchAware
        } else {
            SynthesizerVariant::PitchUnaware
        }
    }

    pub fn needs_pitch(&self) -> bool {
        matches!(self, SynthesizerVariant::PitchAware)
    }
}

impl fmt::Display for SynthesizerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesizerVariant::PitchAware => write!(f, "pitch-aware"),
            SynthesizerVariant::PitchUnaware => write!(f, "pitch-unaware"),
        }
    }
}

/// Pitch inputs of the pitch-aware variant, both `[1, frames]`
#[derive(Debug, Clone)]
pub struct PitchConditioning {
    /// Quantized pitch bins (`u32`, 1 = unvoiced)
    pub coarse: Tensor,
    /// Continuous pitch in Hz (`f32`, 0 = unvoiced)
    pub f0: Tensor,
}

/// A loaded synthesis network
pub trait VoiceSynthesizer: Send + Sync {
    fn variant(&self) -> SynthesizerVariant;

    /// Synthesize a waveform.
    ///
    /// - `phone`: `[1, frames, emb_channels]` content features
    /// - `phone_lengths`: `[1]` frame count
    /// - `pitch`: present exactly when the variant is pitch-aware
    /// - `speaker`: `[1]` speaker id
    ///
    /// Returns `[1, 1, samples]` at the checkpoint's sample rate.
    fn infer(
        &self,
        phone: &Tensor,
        phone_lengths: &Tensor,
        pitch: Option<&PitchConditioning>,
        speaker: &Tensor,
    ) -> Result<Tensor>;
}

/// Builds a [`VoiceSynthesizer`] from migrated weights.
///
/// The weights are already placed on the context's device and dtype; the
/// network must be returned in inference mode.
pub trait SynthesizerFactory: Send + Sync {
    fn build(
        &self,
        variant: SynthesizerVariant,
        config: &RuntimeConfig,
        weights: WeightMap,
        ctx: &ComputeContext,
    ) -> Result<Box<dyn VoiceSynthesizer>>;
}
