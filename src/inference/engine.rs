//! Voice conversion engine
//!
//! Owns the state that would otherwise be process-wide: the active
//! [`ConversionSession`], the [`EmbedderRegistry`] and the [`OutputWriter`].
//! Model loads and conversions are serialized through one gate, so a
//! conversion never observes a half-swapped session.
//!
//! # Example
//!
//! ```rust,ignore
//! use sdkwork_vc::{ConversionRequest, EngineComponents, EngineConfig, VoiceConversionEngine};
//!
//! let engine = VoiceConversionEngine::new(EngineConfig::default(), components)?;
//! engine.load_model("singer.pth")?;
//!
//! let request = ConversionRequest::builder("input.wav")
//!     .f0_up_key(2)
//!     .auto_load_index(true)
//!     .index_rate(0.5)
//!     .build()?;
//! let output = engine.convert(&request)?;
//! println!("wrote {:?}", output.path);
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use super::artifacts::{list_models, ArtifactResolver};
use super::pipeline::ConversionPipeline;
use super::request::ConversionRequest;
use super::session::{ConversionOutput, ConversionServices, ConversionSession, PreparedCheckpoint, SessionInfo};
use crate::audio::OutputWriter;
use crate::checkpoint::CheckpointRecord;
use crate::config::{ComputeContext, EngineConfig};
use crate::core::error::{Result, VcError};
use crate::embedder::{EmbedderLoader, EmbedderRegistry};
use crate::models::SynthesizerFactory;

/// Concrete implementations of the external networks
#[derive(Clone)]
pub struct EngineComponents {
    pub embedder_loader: Arc<dyn EmbedderLoader>,
    pub synthesizer_factory: Arc<dyn SynthesizerFactory>,
    pub pipeline: Arc<dyn ConversionPipeline>,
}

/// Single-session voice conversion engine
pub struct VoiceConversionEngine {
    config: EngineConfig,
    ctx: ComputeContext,
    registry: EmbedderRegistry,
    resolver: ArtifactResolver,
    writer: OutputWriter,
    factory: Arc<dyn SynthesizerFactory>,
    pipeline: Arc<dyn ConversionPipeline>,
    /// Single-flight gate around the active session
    session: Mutex<Option<ConversionSession>>,
}

impl VoiceConversionEngine {
    /// Create an engine, deriving the compute context from `config`
    pub fn new(config: EngineConfig, components: EngineComponents) -> Result<Self> {
        let ctx = config.compute_context()?;
        Ok(Self::with_context(config, ctx, components))
    }

    /// Create an engine with an explicit compute context
    pub fn with_context(config: EngineConfig, ctx: ComputeContext, components: EngineComponents) -> Self {
        let registry = EmbedderRegistry::new(
            components.embedder_loader,
            config.models_dir.clone(),
            ctx.clone(),
        );
        let resolver = ArtifactResolver::new(config.checkpoints_dir());
        let writer = OutputWriter::new(config.output_dir.clone());

        info!(
            "Voice conversion engine: models {:?}, outputs {:?}, {:?} / {:?}",
            config.models_dir,
            config.output_dir,
            ctx.device(),
            ctx.precision()
        );

        Self {
            config,
            ctx,
            registry,
            resolver,
            writer,
            factory: components.synthesizer_factory,
            pipeline: components.pipeline,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compute_context(&self) -> &ComputeContext {
        &self.ctx
    }

    pub fn resolver(&self) -> &ArtifactResolver {
        &self.resolver
    }

    pub fn embedder_registry(&self) -> &EmbedderRegistry {
        &self.registry
    }

    pub fn output_writer(&self) -> &OutputWriter {
        &self.writer
    }

    fn gate(&self, location: &str) -> Result<MutexGuard<'_, Option<ConversionSession>>> {
        self.session.lock().map_err(|_| VcError::poisoned(location))
    }

    /// Checkpoint file names available under `<models>/checkpoints`
    pub fn list_models(&self) -> Result<Vec<String>> {
        list_models(&self.config.models_dir)
    }

    /// Path a model name resolves to
    pub fn checkpoint_path(&self, model_name: &str) -> PathBuf {
        self.resolver.checkpoint_path(model_name)
    }

    /// Read `checkpoints/<model_name>` and make it the active session.
    ///
    /// On any failure the previous session stays active.
    pub fn load_model(&self, model_name: &str) -> Result<SessionInfo> {
        if model_name.trim().is_empty() {
            return Err(VcError::validation("model_name", "model name is empty"));
        }
        let path = self.checkpoint_path(model_name);
        info!("Loading checkpoint {:?}", path);
        let record = CheckpointRecord::load(&path)?;
        self.load_record(model_name, record)
            .map_err(|e| e.with_path(&path))
    }

    /// Make an already-read checkpoint the active session
    pub fn load_record(&self, model_name: &str, record: CheckpointRecord) -> Result<SessionInfo> {
        let mut gate = self.gate("VoiceConversionEngine::load_record")?;

        let prepared =
            PreparedCheckpoint::prepare(model_name, record, self.config.validate_embedder_on_load)?;
        let session = ConversionSession::build(prepared, self.factory.as_ref(), &self.ctx)?;
        let info = session.info().clone();

        if let Some(previous) = gate.replace(session) {
            info!("Replaced session {}", previous.model_name());
        }
        Ok(info)
    }

    /// Normalize a checkpoint without building or activating anything
    pub fn inspect(&self, model_name: &str) -> Result<SessionInfo> {
        let path = self.checkpoint_path(model_name);
        let record = CheckpointRecord::load(&path)?;
        PreparedCheckpoint::prepare(model_name, record, false)
            .map(|prepared| prepared.info())
            .map_err(|e| e.with_path(&path))
    }

    /// Drop the active session, if any
    pub fn unload(&self) -> Result<Option<SessionInfo>> {
        let mut gate = self.gate("VoiceConversionEngine::unload")?;
        Ok(gate.take().map(|session| session.info().clone()))
    }

    /// Info of the active session
    pub fn session_info(&self) -> Result<Option<SessionInfo>> {
        let gate = self.gate("VoiceConversionEngine::session_info")?;
        Ok(gate.as_ref().map(|session| session.info().clone()))
    }

    /// Convert with the active session.
    ///
    /// Requests are validated before any state changes; a failed conversion
    /// writes no file.
    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutput> {
        let gate = self.gate("VoiceConversionEngine::convert")?;
        let session = gate
            .as_ref()
            .ok_or_else(|| VcError::validation("model_name", "no model loaded"))?;

        let services = ConversionServices {
            registry: &self.registry,
            resolver: &self.resolver,
            pipeline: self.pipeline.as_ref(),
            writer: &self.writer,
            ctx: &self.ctx,
        };
        let output = session.convert(request, &services);
        if let Err(e) = &output {
            warn!("Conversion of {:?} failed: {}", request.source_audio, e);
        }
        output
    }
}

impl std::fmt::Debug for VoiceConversionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConversionEngine")
            .field("models_dir", &self.config.models_dir)
            .field("output_dir", &self.config.output_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointMetadata, WeightMap};
    use crate::embedder::{Embedder, EmbedderFamily, OutputLayout};
    use crate::inference::pipeline::PipelineJob;
    use crate::checkpoint::RuntimeConfig;
    use crate::models::{PitchConditioning, SynthesizerVariant, VoiceSynthesizer};
    use candle_core::{DType, Device, Tensor};
    use serde_json::{json, Value};
    use std::path::Path;

    struct NullEmbedder;

    impl Embedder for NullEmbedder {
        fn extract(&self, audio: &Tensor, layout: OutputLayout) -> Result<Tensor> {
            Ok(Tensor::zeros((1, 1, layout.width()), audio.dtype(), audio.device())?)
        }
    }

    struct NullLoader;

    impl EmbedderLoader for NullLoader {
        fn load(&self, _: EmbedderFamily, _: &Path, _: &ComputeContext) -> Result<Arc<dyn Embedder>> {
            Ok(Arc::new(NullEmbedder))
        }
    }

    struct SilentSynth(SynthesizerVariant);

    impl VoiceSynthesizer for SilentSynth {
        fn variant(&self) -> SynthesizerVariant {
            self.0
        }

        fn infer(&self, _: &Tensor, _: &Tensor, _: Option<&PitchConditioning>, _: &Tensor) -> Result<Tensor> {
            Ok(Tensor::zeros((1, 1, 10), DType::F32, &Device::Cpu)?)
        }
    }

    struct SilentFactory;

    impl SynthesizerFactory for SilentFactory {
        fn build(
            &self,
            variant: SynthesizerVariant,
            _: &RuntimeConfig,
            _: WeightMap,
            _: &ComputeContext,
        ) -> Result<Box<dyn VoiceSynthesizer>> {
            Ok(Box::new(SilentSynth(variant)))
        }
    }

    struct FixedPipeline;

    impl ConversionPipeline for FixedPipeline {
        fn run(&self, _job: &PipelineJob<'_>) -> Result<Vec<f32>> {
            Ok(vec![0.0; 100])
        }
    }

    fn engine(dir: &Path) -> VoiceConversionEngine {
        let config = EngineConfig::builder()
            .models_dir(dir.join("models"))
            .output_dir(dir.join("outputs"))
            .build();
        let components = EngineComponents {
            embedder_loader: Arc::new(NullLoader),
            synthesizer_factory: Arc::new(SilentFactory),
            pipeline: Arc::new(FixedPipeline),
        };
        VoiceConversionEngine::with_context(config, ComputeContext::cpu(), components)
    }

    fn config_array(len: usize) -> Vec<Value> {
        let mut values = vec![
            json!(1025), json!(32), json!(192), json!(192), json!(768), json!(2), json!(6),
            json!(3), json!(0.0), json!("1"), json!([3, 7, 11]),
            json!([[1, 3, 5], [1, 3, 5], [1, 3, 5]]), json!([10, 10, 2, 2]), json!(512),
            json!([16, 16, 4, 4]), json!(109), json!(256), json!(256), json!(40000),
        ];
        if len == 18 {
            // Legacy layout lacks emb_channels
            values.remove(17);
        } else {
            values.truncate(len);
        }
        values
    }

    fn record(speakers: usize, config_len: usize, embedder: &str) -> CheckpointRecord {
        let device = Device::Cpu;
        let mut weights = WeightMap::new();
        weights.insert("emb_g.weight", Tensor::zeros((speakers, 256), DType::F32, &device).unwrap());
        weights.insert("enc_p.emb_pitch.weight", Tensor::zeros((256, 192), DType::F32, &device).unwrap());
        weights.insert("enc_p.encoder.w", Tensor::zeros(4, DType::F32, &device).unwrap());
        weights.insert("flow.w", Tensor::zeros(4, DType::F32, &device).unwrap());
        weights.insert("dec.w", Tensor::zeros(4, DType::F32, &device).unwrap());
        let metadata = CheckpointMetadata {
            embedder_name: embedder.to_string(),
            ..CheckpointMetadata::default()
        };
        CheckpointRecord::new(weights, config_array(config_len), metadata)
    }

    #[test]
    fn test_convert_without_model_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let request = ConversionRequest::builder("in.wav").build().unwrap();
        assert!(engine.convert(&request).unwrap_err().is_usage_error());
    }

    #[test]
    fn test_load_record_reports_speaker_count() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let info = engine.load_record("voice.pth", record(4, 19, "hubert_base")).unwrap();
        assert_eq!(info.speaker_count, 4);
        assert_eq!(info.sample_rate, 40000);
        assert_eq!(info.variant, SynthesizerVariant::PitchAware);
    }

    #[test]
    fn test_failed_load_keeps_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.load_record("good.pth", record(2, 19, "hubert_base")).unwrap();

        // Config array too short even with the legacy rule
        let err = engine.load_record("bad.pth", record(2, 10, "hubert_base")).unwrap_err();
        assert!(matches!(err, VcError::CorruptCheckpoint { .. }));

        let err = engine.load_record("odd.pth", record(2, 19, "wav2vec")).unwrap_err();
        assert!(matches!(err, VcError::UnsupportedEmbedder { .. }));

        let info = engine.session_info().unwrap().unwrap();
        assert_eq!(info.model_name, "good.pth");
    }

    #[test]
    fn test_missing_checkpoint_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        assert!(engine.load_model("absent.pth").is_err());
        assert!(engine.load_model("  ").unwrap_err().is_usage_error());
        assert!(engine.session_info().unwrap().is_none());
    }

    #[test]
    fn test_unload() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.load_record("voice.pth", record(1, 18, "contentvec")).unwrap();
        assert_eq!(engine.unload().unwrap().unwrap().model_name, "voice.pth");
        assert!(engine.session_info().unwrap().is_none());
    }
}
