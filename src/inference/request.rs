//! Per-call conversion parameters

use std::path::{Path, PathBuf};

use super::pitch::PitchMethod;
use crate::core::error::{Result, VcError};

/// Immutable parameters of one conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// Target speaker row in the checkpoint's speaker table
    pub speaker_id: u32,
    /// Source audio file
    pub source_audio: PathBuf,
    /// Pitch shift in semitones
    pub f0_up_key: i32,
    /// Optional manual pitch curve file
    pub f0_file: Option<PathBuf>,
    /// Pitch-extraction algorithm
    pub f0_method: PitchMethod,
    /// Resolve index artifacts from the model name when none are given
    pub auto_load_index: bool,
    /// Explicit similarity-index path (overrides auto-resolution)
    pub index_file: Option<PathBuf>,
    /// Explicit dense-vector-store path (overrides auto-resolution)
    pub big_npy_file: Option<PathBuf>,
    /// Blend ratio of index refinement, in `[0, 1]`
    pub index_rate: f64,
}

impl ConversionRequest {
    pub fn builder(source_audio: impl Into<PathBuf>) -> ConversionRequestBuilder {
        ConversionRequestBuilder::new(source_audio)
    }

    /// Check everything that does not depend on the loaded session
    pub fn validate(&self) -> Result<()> {
        if self.source_audio.as_os_str().is_empty() {
            return Err(VcError::validation("source_audio", "source audio path is empty"));
        }
        if !(0.0..=1.0).contains(&self.index_rate) {
            return Err(VcError::validation(
                "index_rate",
                format!("index rate {} outside [0, 1]", self.index_rate),
            ));
        }
        Ok(())
    }

    /// Explicit index paths, if the caller supplied a non-empty one
    fn explicit(path: &Option<PathBuf>) -> Option<&Path> {
        path.as_deref().filter(|p| !p.as_os_str().is_empty())
    }

    pub fn explicit_index(&self) -> Option<&Path> {
        Self::explicit(&self.index_file)
    }

    pub fn explicit_vectors(&self) -> Option<&Path> {
        Self::explicit(&self.big_npy_file)
    }

    /// Source file stem used in output names
    pub fn source_name(&self) -> String {
        self.source_audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Builder for [`ConversionRequest`]
#[derive(Debug, Clone)]
pub struct ConversionRequestBuilder {
    request: ConversionRequest,
}

impl ConversionRequestBuilder {
    pub fn new(source_audio: impl Into<PathBuf>) -> Self {
        Self {
            request: ConversionRequest {
                speaker_id: 0,
                source_audio: source_audio.into(),
                f0_up_key: 0,
                f0_file: None,
                f0_method: PitchMethod::default(),
                auto_load_index: false,
                index_file: None,
                big_npy_file: None,
                index_rate: 0.0,
            },
        }
    }

    pub fn speaker_id(mut self, speaker_id: u32) -> Self {
        self.request.speaker_id = speaker_id;
        self
    }

    pub fn f0_up_key(mut self, semitones: i32) -> Self {
        self.request.f0_up_key = semitones;
        self
    }

    pub fn f0_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.request.f0_file = Some(path.into());
        self
    }

    pub fn f0_method(mut self, method: PitchMethod) -> Self {
        self.request.f0_method = method;
        self
    }

    /// Select the pitch method by name (`pm`, `harvest`, `dio`, `crepe`, `mangio-crepe`, `rmvpe`)
    pub fn f0_method_name(mut self, name: &str) -> Result<Self> {
        self.request.f0_method = name.parse()?;
        Ok(self)
    }

    pub fn auto_load_index(mut self, enable: bool) -> Self {
        self.request.auto_load_index = enable;
        self
    }

    pub fn index_files(mut self, index: impl Into<PathBuf>, vectors: impl Into<PathBuf>) -> Self {
        self.request.index_file = Some(index.into());
        self.request.big_npy_file = Some(vectors.into());
        self
    }

    pub fn index_rate(mut self, rate: f64) -> Self {
        self.request.index_rate = rate;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<ConversionRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}
