//! Similarity-index refinement
//!
//! The search structure is external. Given a loaded index, every feature
//! frame is replaced by a blend of itself and its retrieved neighbour.

use candle_core::{DType, Tensor};
use std::path::Path;

use crate::core::error::{Result, VcError};

/// A loaded nearest-neighbour index over reference feature vectors
pub trait FeatureIndex: Send + Sync {
    /// Retrieve the reference vector for every row of `features` (`[frames, width]`, f32).
    ///
    /// Returns a tensor of the same shape.
    fn retrieve(&self, features: &Tensor) -> Result<Tensor>;
}

/// Opens an index together with its dense vector store
pub trait IndexLoader: Send + Sync {
    fn load(&self, index_path: &Path, vectors_path: &Path) -> Result<Box<dyn FeatureIndex>>;
}

/// `rate * retrieved + (1 - rate) * features`
pub fn blend(features: &Tensor, retrieved: &Tensor, rate: f64) -> Result<Tensor> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(VcError::validation(
            "index_rate",
            format!("index rate {} outside [0, 1]", rate),
        ));
    }
    if features.dims() != retrieved.dims() {
        return Err(VcError::Inference {
            stage: crate::core::error::InferenceStage::IndexRetrieval,
            message: format!(
                "retrieved shape {:?} does not match features {:?}",
                retrieved.dims(),
                features.dims()
            ),
        });
    }
    let retrieved = retrieved.to_dtype(features.dtype())?;
    Ok(((retrieved * rate)? + (features * (1.0 - rate))?)?)
}

/// Refine `[1, frames, width]` features through `index`, keeping their dtype
pub fn refine(features: &Tensor, index: &dyn FeatureIndex, rate: f64) -> Result<Tensor> {
    let dtype = features.dtype();
    let frames = features.squeeze(0)?.to_dtype(DType::F32)?;
    let retrieved = index.retrieve(&frames)?;
    let blended = blend(&frames, &retrieved, rate)?;
    Ok(blended.unsqueeze(0)?.to_dtype(dtype)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    struct ConstantIndex(f32);

    impl FeatureIndex for ConstantIndex {
        fn retrieve(&self, features: &Tensor) -> Result<Tensor> {
            Ok((features.ones_like()? * self.0 as f64)?)
        }
    }

    #[test]
    fn test_blend_halfway() {
        let device = Device::Cpu;
        let feats = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        let retrieved = Tensor::ones((2, 3), DType::F32, &device).unwrap();
        let out = blend(&feats, &retrieved, 0.5).unwrap();
        let values: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_blend_rejects_out_of_range_rate() {
        let device = Device::Cpu;
        let feats = Tensor::zeros((1, 1), DType::F32, &device).unwrap();
        assert!(blend(&feats, &feats, 1.5).unwrap_err().is_usage_error());
    }

    #[test]
    fn test_refine_keeps_shape() {
        let device = Device::Cpu;
        let feats = Tensor::zeros((1, 4, 8), DType::F32, &device).unwrap();
        let out = refine(&feats, &ConstantIndex(2.0), 0.25).unwrap();
        assert_eq!(out.dims(), &[1, 4, 8]);
        let values: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }
}
