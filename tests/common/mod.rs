//! Mock networks and fixtures shared by the integration tests

#![allow(dead_code)]

use candle_core::{DType, Device, Tensor};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sdkwork_vc::checkpoint::{save_safetensors, CheckpointMetadata, CheckpointRecord, RuntimeConfig, WeightMap};
use sdkwork_vc::config::{ComputeContext, EngineConfig};
use sdkwork_vc::embedder::{Embedder, EmbedderFamily, EmbedderLoader, OutputLayout};
use sdkwork_vc::inference::{
    EngineComponents, FeatureIndex, IndexLoader, PitchExtractor, PitchMethod, StagedPipeline,
    VoiceConversionEngine,
};
use sdkwork_vc::models::{PitchConditioning, SynthesizerFactory, SynthesizerVariant, VoiceSynthesizer};
use sdkwork_vc::{Result, VcError};

/// One zero frame per 320 input samples, as wide as the layout asks
pub struct ZeroEmbedder;

impl Embedder for ZeroEmbedder {
    fn extract(&self, audio: &Tensor, layout: OutputLayout) -> Result<Tensor> {
        let frames = audio.dim(1)? / 320;
        Ok(Tensor::zeros((1, frames, layout.width()), audio.dtype(), audio.device())?)
    }
}

#[derive(Default)]
pub struct CountingEmbedderLoader {
    pub loads: AtomicUsize,
    pub families: Mutex<Vec<EmbedderFamily>>,
}

impl CountingEmbedderLoader {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl EmbedderLoader for CountingEmbedderLoader {
    fn load(&self, family: EmbedderFamily, _weights: &Path, _ctx: &ComputeContext) -> Result<Arc<dyn Embedder>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.families.lock().unwrap().push(family);
        Ok(Arc::new(ZeroEmbedder))
    }
}

/// Emits `frames * hop_length` samples of constant amplitude
pub struct ConstantSynth {
    variant: SynthesizerVariant,
    hop: usize,
    fail: bool,
    pub saw_pitch: Arc<Mutex<Vec<bool>>>,
    pub coarse: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl VoiceSynthesizer for ConstantSynth {
    fn variant(&self) -> SynthesizerVariant {
        self.variant
    }

    fn infer(
        &self,
        phone: &Tensor,
        _phone_lengths: &Tensor,
        pitch: Option<&PitchConditioning>,
        _speaker: &Tensor,
    ) -> Result<Tensor> {
        self.saw_pitch.lock().unwrap().push(pitch.is_some());
        if let Some(pitch) = pitch {
            let bins = pitch.coarse.squeeze(0)?.to_vec1::<u32>()?;
            self.coarse.lock().unwrap().push(bins);
        }
        if self.fail {
            return Err(VcError::Internal {
                message: "decoder diverged".to_string(),
                location: Some("ConstantSynth::infer".to_string()),
            });
        }
        let frames = phone.dim(1)?;
        Ok((Tensor::ones((1, 1, frames * self.hop), DType::F32, phone.device())? * 0.5)?)
    }
}

#[derive(Default)]
pub struct ConstantSynthFactory {
    pub builds: AtomicUsize,
    /// Synthesizers built while set fail every inference
    pub fail: AtomicBool,
    pub saw_pitch: Arc<Mutex<Vec<bool>>>,
    pub coarse: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl SynthesizerFactory for ConstantSynthFactory {
    fn build(
        &self,
        variant: SynthesizerVariant,
        config: &RuntimeConfig,
        weights: WeightMap,
        _ctx: &ComputeContext,
    ) -> Result<Box<dyn VoiceSynthesizer>> {
        assert!(!weights.has_prefix("enc_q."), "training-only weights reached the factory");
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ConstantSynth {
            variant,
            hop: config.hop_length(),
            fail: self.fail.load(Ordering::SeqCst),
            saw_pitch: Arc::clone(&self.saw_pitch),
            coarse: Arc::clone(&self.coarse),
        }))
    }
}

pub struct FlatPitch;

impl PitchExtractor for FlatPitch {
    fn extract(&self, _audio: &[f32], _method: PitchMethod, frames: usize) -> Result<Vec<f32>> {
        Ok(vec![220.0; frames])
    }
}

pub struct IdentityIndex;

impl FeatureIndex for IdentityIndex {
    fn retrieve(&self, features: &Tensor) -> Result<Tensor> {
        Ok(features.clone())
    }
}

#[derive(Default)]
pub struct CountingIndexLoader {
    pub opened: Mutex<Vec<PathBuf>>,
}

impl IndexLoader for CountingIndexLoader {
    fn load(&self, index_path: &Path, _vectors_path: &Path) -> Result<Box<dyn FeatureIndex>> {
        self.opened.lock().unwrap().push(index_path.to_path_buf());
        Ok(Box::new(IdentityIndex))
    }
}

/// Engine over a temporary models/outputs tree, with handles on every mock
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub engine: VoiceConversionEngine,
    pub embedders: Arc<CountingEmbedderLoader>,
    pub synthesizers: Arc<ConstantSynthFactory>,
    pub indexes: Arc<CountingIndexLoader>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::builder()
            .models_dir(dir.path().join("models"))
            .output_dir(dir.path().join("outputs"))
            .build();

        let embedders = Arc::new(CountingEmbedderLoader::default());
        let synthesizers = Arc::new(ConstantSynthFactory::default());
        let indexes = Arc::new(CountingIndexLoader::default());
        let components = EngineComponents {
            embedder_loader: embedders.clone(),
            synthesizer_factory: synthesizers.clone(),
            pipeline: Arc::new(StagedPipeline::new(Arc::new(FlatPitch), indexes.clone())),
        };
        let engine = VoiceConversionEngine::with_context(config, ComputeContext::cpu(), components);

        Self {
            dir,
            engine,
            embedders,
            synthesizers,
            indexes,
        }
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.engine.config().checkpoints_dir()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.engine.config().output_dir.clone()
    }

    /// Write `record` as `checkpoints/<name>`
    pub fn install_checkpoint(&self, name: &str, record: &CheckpointRecord) -> PathBuf {
        let dir = self.checkpoints_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        save_safetensors(record, &path).unwrap();
        path
    }

    /// Write a mono 16 kHz sine of `seconds` and return its path
    pub fn source_audio(&self, name: &str, seconds: f32) -> PathBuf {
        let path = self.dir.path().join(name);
        write_sine(&path, 16_000, seconds);
        path
    }

    pub fn output_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.output_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn write_sine(path: &Path, sample_rate: u32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let n = (sample_rate as f32 * seconds) as usize;
    for i in 0..n {
        let t = i as f32 / sample_rate as f32;
        let s = (t * 220.0 * 2.0 * std::f32::consts::PI).sin() * 0.3;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Canonical 19-entry configuration array at 40 kHz (hop 400)
pub fn config_array(spk_embed_dim: usize) -> Vec<Value> {
    vec![
        json!(1025),
        json!(32),
        json!(192),
        json!(192),
        json!(768),
        json!(2),
        json!(6),
        json!(3),
        json!(0),
        json!("1"),
        json!([3, 7, 11]),
        json!([[1, 3, 5], [1, 3, 5], [1, 3, 5]]),
        json!([10, 10, 2, 2]),
        json!(512),
        json!([16, 16, 4, 4]),
        json!(spk_embed_dim),
        json!(256),
        json!(256),
        json!(40000),
    ]
}

/// Same configuration without `emb_channels`
pub fn legacy_config_array(spk_embed_dim: usize) -> Vec<Value> {
    let mut values = config_array(spk_embed_dim);
    values.remove(17);
    values
}

/// A checkpoint with `speakers` rows in its speaker table
pub fn checkpoint(speakers: usize, config: Vec<Value>, f0: i64, embedder: &str) -> CheckpointRecord {
    let device = Device::Cpu;
    let zeros = |shape: &[usize]| Tensor::zeros(shape, DType::F32, &device).unwrap();

    let mut weights = WeightMap::new();
    weights.insert("emb_g.weight", zeros(&[speakers, 256]));
    if f0 == 1 {
        weights.insert("enc_p.emb_pitch.weight", zeros(&[256, 192]));
    }
    weights.insert("enc_p.emb_phone.weight", zeros(&[192, 256]));
    weights.insert("flow.flows.0.enc.in_layers.0.bias", zeros(&[384]));
    weights.insert("dec.conv_pre.weight", zeros(&[512, 192, 7]));
    weights.insert("enc_q.pre.weight", zeros(&[192, 1025, 1]));

    let metadata = CheckpointMetadata {
        f0,
        embedder_name: embedder.to_string(),
        version: Some("v1".to_string()),
        ..CheckpointMetadata::default()
    };
    CheckpointRecord::new(weights, config, metadata)
}
