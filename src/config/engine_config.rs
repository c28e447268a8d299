//! Engine configuration
//!
//! Loaded once at process start (YAML file, then environment overrides) and
//! turned into an immutable [`ComputeContext`] that is handed to every
//! component that places tensors.

use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::{Result, VcError};

/// Environment variable overriding the models root
pub const ENV_MODELS_DIR: &str = "SDKWORK_VC_MODELS_DIR";
/// Environment variable overriding the output directory
pub const ENV_OUTPUT_DIR: &str = "SDKWORK_VC_OUTPUT_DIR";
/// Environment variable selecting the device (`cpu` or `cuda`)
pub const ENV_DEVICE: &str = "SDKWORK_VC_DEVICE";
/// Environment variable selecting the precision (`half` or `full`)
pub const ENV_PRECISION: &str = "SDKWORK_VC_PRECISION";

/// Numeric precision used for every loaded network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 16-bit floats
    Half,
    /// 32-bit floats
    #[default]
    Full,
}

impl Precision {
    /// Candle dtype for this precision
    pub fn dtype(&self) -> DType {
        match self {
            Precision::Half => DType::F16,
            Precision::Full => DType::F32,
        }
    }
}

impl std::str::FromStr for Precision {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "half" | "fp16" | "f16" => Ok(Precision::Half),
            "full" | "fp32" | "f32" => Ok(Precision::Full),
            _ => Err(VcError::Config {
                message: format!("Unknown precision: {}", s),
                path: None,
            }),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root of the models tree (`checkpoints/`, `pretrained/`, embedder files)
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Directory receiving converted WAV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Use CUDA when available
    #[serde(default)]
    pub use_gpu: bool,

    /// Numeric precision for loaded networks
    #[serde(default)]
    pub precision: Precision,

    /// Base URL of the pretrained weight repository
    #[serde(default = "default_pretrained_repo_url")]
    pub pretrained_repo_url: String,

    /// Base URL of the contentvec weight repository
    #[serde(default = "default_contentvec_url")]
    pub contentvec_url: String,

    /// Reject checkpoints requiring an unknown embedder at load time
    #[serde(default = "default_true")]
    pub validate_embedder_on_load: bool,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_pretrained_repo_url() -> String {
    "https://huggingface.co/ddPn08/rvc_pretrained/resolve/main".to_string()
}

fn default_contentvec_url() -> String {
    "https://huggingface.co/innnky/contentvec/resolve/main".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            output_dir: default_output_dir(),
            use_gpu: false,
            precision: Precision::default(),
            pretrained_repo_url: default_pretrained_repo_url(),
            contentvec_url: default_contentvec_url(),
            validate_embedder_on_load: true,
        }
    }
}

impl EngineConfig {
    /// Create configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| VcError::Config {
            message: format!("Failed to read config file: {}", e),
            path: Some(path.to_path_buf()),
        })?;

        serde_yaml::from_str(&content).map_err(|e| VcError::Config {
            message: format!("Failed to parse config YAML: {}", e),
            path: Some(path.to_path_buf()),
        })
    }

    /// Apply `SDKWORK_VC_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var(ENV_MODELS_DIR) {
            self.models_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(device) = std::env::var(ENV_DEVICE) {
            self.use_gpu = match device.to_lowercase().as_str() {
                "cuda" | "gpu" => true,
                "cpu" => false,
                other => {
                    return Err(VcError::Config {
                        message: format!("Unknown device in {}: {}", ENV_DEVICE, other),
                        path: None,
                    })
                }
            };
        }
        if let Ok(precision) = std::env::var(ENV_PRECISION) {
            self.precision = precision.parse()?;
        }
        Ok(self)
    }

    /// Directory holding conversion checkpoints
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.models_dir.join("checkpoints")
    }

    /// Directory holding pretrained base weights
    pub fn pretrained_dir(&self) -> PathBuf {
        self.models_dir.join("pretrained")
    }

    /// Resolve the device and dtype every network is placed on
    pub fn compute_context(&self) -> Result<ComputeContext> {
        let device = if self.use_gpu {
            Device::cuda_if_available(0)?
        } else {
            Device::Cpu
        };
        Ok(ComputeContext::new(device, self.precision))
    }
}

/// Device placement and numeric precision shared by all loaded networks
#[derive(Debug, Clone)]
pub struct ComputeContext {
    device: Device,
    precision: Precision,
}

impl ComputeContext {
    /// Build a context; half precision on CPU falls back to full precision
    pub fn new(device: Device, precision: Precision) -> Self {
        let precision = if precision == Precision::Half && device.is_cpu() {
            tracing::warn!("Half precision is not supported on CPU, using full precision");
            Precision::Full
        } else {
            precision
        };
        Self { device, precision }
    }

    /// CPU, full precision
    pub fn cpu() -> Self {
        Self::new(Device::Cpu, Precision::Full)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn dtype(&self) -> DType {
        self.precision.dtype()
    }

    pub fn is_half(&self) -> bool {
        self.precision == Precision::Half
    }
}

/// Engine configuration builder
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Set the models root
    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.models_dir = dir.into();
        self
    }

    /// Set the output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Enable/disable GPU
    pub fn gpu(mut self, enable: bool) -> Self {
        self.config.use_gpu = enable;
        self
    }

    /// Set numeric precision
    pub fn precision(mut self, precision: Precision) -> Self {
        self.config.precision = precision;
        self
    }

    /// Validate the embedder requirement when a checkpoint is loaded
    pub fn validate_embedder_on_load(mut self, enable: bool) -> Self {
        self.config.validate_embedder_on_load = enable;
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
