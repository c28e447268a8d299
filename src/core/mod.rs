//! Core types shared by every module
//!
//! - `error`: the crate error enum, stage tags and the `ResultExt` helper

pub mod error;

pub use error::{AudioOperation, InferenceStage, Result, ResultExt, VcError};
