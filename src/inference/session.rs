//! Conversion session
//!
//! A session binds one synthesizer to the configuration it was built from.
//! Construction is split in two so the checkpoint can be inspected without
//! instantiating any network:
//!
//! 1. [`PreparedCheckpoint::prepare`]: normalize the config, take the speaker
//!    count from the weights, pick the variant, check the embedder, migrate the
//!    weights.
//! 2. [`ConversionSession::build`]: place the weights and build the network.
//!
//! Nothing is shared with a previous session until both steps succeed.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use super::artifacts::ArtifactResolver;
use super::pipeline::{ConversionPipeline, PipelineJob};
use super::pitch::PitchCurve;
use super::request::ConversionRequest;
use crate::audio::{AudioLoader, OutputWriter};
use crate::checkpoint::{
    normalize, CheckpointMetadata, CheckpointParams, CheckpointRecord, RuntimeConfig, WeightMap,
};
use crate::config::ComputeContext;
use crate::core::error::{Result, VcError};
use crate::embedder::{EmbedderKind, EmbedderRegistry, EMBEDDER_HOP, EMBEDDER_SAMPLE_RATE};
use crate::models::{SchemaReport, SynthesizerFactory, SynthesizerVariant, VoiceSynthesizer, WeightSchema};

/// Summary of a loaded (or inspected) checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub model_name: String,
    pub sample_rate: u32,
    pub speaker_count: usize,
    pub variant: SynthesizerVariant,
    pub embedder_name: String,
    pub version: Option<String>,
    pub config: RuntimeConfig,
    pub dropped_training_tensors: usize,
    pub discarded_unknown_tensors: usize,
}

/// Checkpoint after normalization and weight migration, before any network exists
#[derive(Debug)]
pub struct PreparedCheckpoint {
    model_name: String,
    params: CheckpointParams,
    config: RuntimeConfig,
    variant: SynthesizerVariant,
    embedder_name: String,
    speaker_count: usize,
    metadata: CheckpointMetadata,
    weights: WeightMap,
    report: SchemaReport,
}

impl PreparedCheckpoint {
    /// Normalize `record` for `model_name`.
    ///
    /// With `validate_embedder`, an unsupported embedder name fails here
    /// instead of at conversion time.
    pub fn prepare(
        model_name: &str,
        record: CheckpointRecord,
        validate_embedder: bool,
    ) -> Result<Self> {
        // The speaker table is authoritative for the speaker count
        let speaker_count = record.speaker_table_rows()?;
        let CheckpointRecord {
            weights,
            config,
            params,
            metadata,
        } = record;

        let mut params = normalize(&config, params.as_ref())?;
        if let Some(stored) = params.get("spk_embed_dim").and_then(|v| v.as_u64()) {
            if stored as usize != speaker_count {
                warn!(
                    "Stored spk_embed_dim {} disagrees with speaker table ({} rows), using {}",
                    stored, speaker_count, speaker_count
                );
            }
        }
        params.set("spk_embed_dim", speaker_count);
        params.ensure_emb_channels();

        let config = RuntimeConfig::from_params(&params)?;
        let variant = SynthesizerVariant::from_f0_flag(metadata.f0);

        let embedder_name = metadata.embedder_name.clone();
        match embedder_name.parse::<EmbedderKind>() {
            Ok(kind) if kind.output_width() != config.emb_channels => warn!(
                "Embedder {} produces {}-wide features but the checkpoint expects {}",
                kind,
                kind.output_width(),
                config.emb_channels
            ),
            Ok(_) => {}
            Err(e) if validate_embedder => return Err(e),
            Err(_) => warn!(
                "Checkpoint requires unsupported embedder '{}'; conversion will fail",
                embedder_name
            ),
        }

        let (weights, report) = WeightSchema::for_variant(variant).apply(weights)?;

        Ok(Self {
            model_name: model_name.to_string(),
            params,
            config,
            variant,
            embedder_name,
            speaker_count,
            metadata,
            weights,
            report,
        })
    }

    pub fn params(&self) -> &CheckpointParams {
        &self.params
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            model_name: self.model_name.clone(),
            sample_rate: self.config.sr,
            speaker_count: self.speaker_count,
            variant: self.variant,
            embedder_name: self.embedder_name.clone(),
            version: self.metadata.version.clone(),
            config: self.config.clone(),
            dropped_training_tensors: self.report.dropped_training,
            discarded_unknown_tensors: self.report.discarded_unknown.len(),
        }
    }
}

/// Collaborators a conversion runs against
pub struct ConversionServices<'a> {
    pub registry: &'a EmbedderRegistry,
    pub resolver: &'a ArtifactResolver,
    pub pipeline: &'a dyn ConversionPipeline,
    pub writer: &'a OutputWriter,
    pub ctx: &'a ComputeContext,
}

/// Result of one conversion
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Mono samples at `sample_rate`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Where the WAV copy was written
    pub path: PathBuf,
}

impl ConversionOutput {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One loaded voice-conversion model
pub struct ConversionSession {
    info: SessionInfo,
    synthesizer: Box<dyn VoiceSynthesizer>,
}

impl ConversionSession {
    /// Prepare and build in one step
    pub fn load(
        model_name: &str,
        record: CheckpointRecord,
        factory: &dyn SynthesizerFactory,
        ctx: &ComputeContext,
        validate_embedder: bool,
    ) -> Result<Self> {
        let prepared = PreparedCheckpoint::prepare(model_name, record, validate_embedder)?;
        Self::build(prepared, factory, ctx)
    }

    /// Place the migrated weights and construct the synthesizer
    pub fn build(
        prepared: PreparedCheckpoint,
        factory: &dyn SynthesizerFactory,
        ctx: &ComputeContext,
    ) -> Result<Self> {
        let info = prepared.info();
        let weights = prepared.weights.to_placement(ctx)?;
        let synthesizer = factory.build(prepared.variant, &prepared.config, weights, ctx)?;
        if synthesizer.variant() != prepared.variant {
            return Err(VcError::ModelLoad {
                message: format!(
                    "factory built a {} synthesizer, {} requested",
                    synthesizer.variant(),
                    prepared.variant
                ),
                component: "synthesizer".to_string(),
                path: None,
            });
        }

        info!(
            "Session ready: {} ({}, {} Hz, {} speakers, embedder {})",
            info.model_name, info.variant, info.sample_rate, info.speaker_count, info.embedder_name
        );
        Ok(Self { info, synthesizer })
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn model_name(&self) -> &str {
        &self.info.model_name
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    pub fn speaker_count(&self) -> usize {
        self.info.speaker_count
    }

    pub fn variant(&self) -> SynthesizerVariant {
        self.info.variant
    }

    pub fn embedder_name(&self) -> &str {
        &self.info.embedder_name
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.info.config
    }

    /// Check a request against this session without touching any state
    pub fn validate(&self, request: &ConversionRequest) -> Result<()> {
        request.validate()?;
        if request.speaker_id as usize >= self.speaker_count() {
            return Err(VcError::validation(
                "speaker_id",
                format!(
                    "speaker id {} out of range, model has {} speakers",
                    request.speaker_id,
                    self.speaker_count()
                ),
            ));
        }
        Ok(())
    }

    /// Convert `request.source_audio` to this session's voice and persist the result
    pub fn convert(
        &self,
        request: &ConversionRequest,
        services: &ConversionServices<'_>,
    ) -> Result<ConversionOutput> {
        self.validate(request)?;
        let pitch_curve = match &request.f0_file {
            Some(path) if !path.as_os_str().is_empty() => Some(PitchCurve::load(path)?),
            _ => None,
        };

        let audio = AudioLoader::load_mono(&request.source_audio, EMBEDDER_SAMPLE_RATE)?;
        // Less than one embedder frame yields no pitch frames at all
        if audio.len() < EMBEDDER_HOP {
            return Err(VcError::validation(
                "source_audio",
                format!(
                    "source audio is too short to convert ({} samples at {} Hz)",
                    audio.len(),
                    EMBEDDER_SAMPLE_RATE
                ),
            ));
        }
        let embedder = services.registry.ensure_loaded(self.embedder_name())?;

        let mut index_path = request.explicit_index().map(|p| p.to_path_buf());
        let mut vectors_path = request.explicit_vectors().map(|p| p.to_path_buf());
        if request.auto_load_index {
            if index_path.is_none() {
                index_path = Some(
                    services
                        .resolver
                        .resolve_index(self.model_name(), request.speaker_id),
                );
            }
            if vectors_path.is_none() {
                vectors_path = Some(
                    services
                        .resolver
                        .resolve_vectors(self.model_name(), request.speaker_id),
                );
            }
        }

        let job = PipelineJob {
            audio: &audio,
            embedder: &embedder,
            synthesizer: self.synthesizer.as_ref(),
            speaker_id: request.speaker_id,
            f0_up_key: request.f0_up_key,
            f0_method: request.f0_method,
            pitch_curve: pitch_curve.as_ref(),
            index_path: index_path.as_deref(),
            vectors_path: vectors_path.as_deref(),
            index_rate: request.index_rate,
            ctx: services.ctx,
        };
        let samples = services.pipeline.run(&job)?;

        let sample_rate = self.target_sample_rate();
        let path = services.writer.write(
            &samples,
            sample_rate,
            self.model_name(),
            &request.source_name(),
        )?;

        Ok(ConversionOutput {
            samples,
            sample_rate,
            path,
        })
    }
}
