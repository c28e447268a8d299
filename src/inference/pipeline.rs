//! Conversion pipeline
//!
//! ```text
//! 16 kHz audio ─► embedder features (hop 320)
//!              ─► index refinement (optional)
//!              ─► 2× frame upsampling onto the 100 fps pitch grid
//!              ─► pitch: extract, shift, manual override, quantize (pitch-aware only)
//!              ─► synthesis at the checkpoint's rate
//!              ─► peak guard
//! ```
//!
//! Each stage's failure is tagged with the stage it came from.

use candle_core::{DType, Tensor};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::index::{refine, IndexLoader};
use super::pitch::{
    coarse_pitch, resize_curve, shift_pitch, PitchCurve, PitchExtractor, PitchMethod, PITCH_HOP,
};
use crate::config::ComputeContext;
use crate::core::error::{InferenceStage, Result, VcError};
use crate::embedder::EmbedderHandle;
use crate::models::{PitchConditioning, VoiceSynthesizer};

/// Peak the output is scaled down to when it would clip
pub const OUTPUT_PEAK: f32 = 0.99;

/// Everything one pipeline run needs
pub struct PipelineJob<'a> {
    /// 16 kHz mono source
    pub audio: &'a [f32],
    pub embedder: &'a EmbedderHandle,
    pub synthesizer: &'a dyn VoiceSynthesizer,
    pub speaker_id: u32,
    pub f0_up_key: i32,
    pub f0_method: PitchMethod,
    pub pitch_curve: Option<&'a PitchCurve>,
    pub index_path: Option<&'a Path>,
    pub vectors_path: Option<&'a Path>,
    pub index_rate: f64,
    pub ctx: &'a ComputeContext,
}

/// Runs the signal stages of one conversion
pub trait ConversionPipeline: Send + Sync {
    /// Returns mono samples at the synthesizer's rate
    fn run(&self, job: &PipelineJob<'_>) -> Result<Vec<f32>>;
}

/// Default pipeline over external pitch and index implementations
pub struct StagedPipeline {
    pitch: Arc<dyn PitchExtractor>,
    index_loader: Arc<dyn IndexLoader>,
}

impl StagedPipeline {
    pub fn new(pitch: Arc<dyn PitchExtractor>, index_loader: Arc<dyn IndexLoader>) -> Self {
        Self {
            pitch,
            index_loader,
        }
    }

    fn extract_features(&self, job: &PipelineJob<'_>) -> Result<Tensor> {
        let stage = |e: VcError| tag(InferenceStage::FeatureExtraction, e);
        let audio = Tensor::from_slice(job.audio, (1, job.audio.len()), job.ctx.device())
            .and_then(|t| t.to_dtype(job.ctx.dtype()))
            .map_err(|e| stage(e.into()))?;
        let feats = job.embedder.extract(&audio).map_err(stage)?;

        let expected = job.embedder.layout().width();
        match feats.dims() {
            [1, _, width] if *width == expected => Ok(feats),
            dims => Err(VcError::at_stage(
                InferenceStage::FeatureExtraction,
                format!("embedder returned {:?}, expected [1, frames, {}]", dims, expected),
            )),
        }
    }

    fn refine_with_index(&self, feats: Tensor, job: &PipelineJob<'_>) -> Result<Tensor> {
        let (Some(index_path), Some(vectors_path)) = (job.index_path, job.vectors_path) else {
            return Ok(feats);
        };
        if job.index_rate == 0.0 {
            debug!("Index rate is 0, skipping refinement");
            return Ok(feats);
        }
        if !index_path.is_file() || !vectors_path.is_file() {
            warn!(
                "Index artifacts not found ({:?}, {:?}), skipping refinement",
                index_path, vectors_path
            );
            return Ok(feats);
        }

        let stage = |e: VcError| tag(InferenceStage::IndexRetrieval, e);
        let index = self
            .index_loader
            .load(index_path, vectors_path)
            .map_err(stage)?;
        let refined = refine(&feats, index.as_ref(), job.index_rate).map_err(stage)?;
        debug!("Refined features with {:?} at rate {}", index_path, job.index_rate);
        Ok(refined)
    }

    fn pitch_conditioning(&self, job: &PipelineJob<'_>, frames: usize) -> Result<PitchConditioning> {
        let stage = |e: VcError| tag(InferenceStage::PitchExtraction, e);
        let raw = self
            .pitch
            .extract(job.audio, job.f0_method, frames)
            .map_err(stage)?;

        let mut f0 = resize_curve(&raw, frames);
        shift_pitch(&mut f0, job.f0_up_key);
        if let Some(curve) = job.pitch_curve {
            curve.apply(&mut f0);
        }
        let coarse = coarse_pitch(&f0);

        let device = job.ctx.device();
        let build = || -> candle_core::Result<PitchConditioning> {
            Ok(PitchConditioning {
                coarse: Tensor::from_vec(coarse, (1, frames), device)?,
                f0: Tensor::from_vec(f0, (1, frames), device)?.to_dtype(job.ctx.dtype())?,
            })
        };
        build().map_err(|e| stage(e.into()))
    }
}

impl ConversionPipeline for StagedPipeline {
    fn run(&self, job: &PipelineJob<'_>) -> Result<Vec<f32>> {
        let feats = self.extract_features(job)?;
        let feats = self.refine_with_index(feats, job)?;

        // Every embedder frame covers two pitch frames
        let (_, frames, width) = feats.dims3()?;
        let feats = Tensor::stack(&[&feats, &feats], 2)?.reshape((1, frames * 2, width))?;
        let p_len = (frames * 2).min(job.audio.len() / PITCH_HOP);
        if p_len == 0 {
            return Err(VcError::validation(
                "source_audio",
                "source audio is too short to convert",
            ));
        }
        let feats = feats.narrow(1, 0, p_len)?;

        let pitch = if job.synthesizer.variant().needs_pitch() {
            Some(self.pitch_conditioning(job, p_len)?)
        } else {
            None
        };

        let device = job.ctx.device();
        let phone_lengths = Tensor::new(&[p_len as i64], device)?;
        let speaker = Tensor::new(&[job.speaker_id as i64], device)?;

        let stage = |e: VcError| tag(InferenceStage::Synthesis, e);
        let wave = job
            .synthesizer
            .infer(&feats, &phone_lengths, pitch.as_ref(), &speaker)
            .map_err(stage)?;
        let mut samples: Vec<f32> = wave
            .flatten_all()
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec1())
            .map_err(|e| stage(e.into()))?;

        limit_peak(&mut samples, OUTPUT_PEAK);
        info!("Synthesized {} samples from {} frames", samples.len(), p_len);
        Ok(samples)
    }
}

/// Wrap untagged errors with `stage`; keep usage errors and existing tags
fn tag(stage: InferenceStage, err: VcError) -> VcError {
    match err {
        VcError::Inference { .. } | VcError::Validation { .. } => err,
        other => VcError::at_stage(stage, other),
    }
}

/// Scale down so the absolute peak does not exceed `peak`
pub fn limit_peak(samples: &mut [f32], peak: f32) {
    let max = samples.iter().fold(0f32, |m, s| m.max(s.abs()));
    if max > peak {
        let gain = peak / max;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
}
