//! Configuration
//!
//! - `EngineConfig`: directories, device, precision, asset sources
//! - `ComputeContext`: the device/precision pair every loaded network shares

mod engine_config;

pub use engine_config::{
    ComputeContext, EngineConfig, EngineConfigBuilder, Precision, ENV_DEVICE, ENV_MODELS_DIR,
    ENV_OUTPUT_DIR, ENV_PRECISION,
};
