//! Sample-rate conversion using rubato
//!
//! Short clips go through a single high-quality pass; longer ones are fed in
//! fixed-size chunks so the sinc resampler never holds the whole clip twice.

use anyhow::{Context, Result};
use rubato::{
    calculate_cutoff, Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

/// Input frames per chunk in chunked mode
const CHUNK_SIZE: usize = 1024;

/// Sinc resampler
pub struct Resampler;

impl Resampler {
    /// Resample mono `samples` from `from_sr` to `to_sr`.
    ///
    /// The output is trimmed or zero-padded to `round(len * to_sr / from_sr)`
    /// so durations survive the conversion exactly.
    pub fn resample(samples: &[f32], from_sr: u32, to_sr: u32) -> Result<Vec<f32>> {
        if from_sr == to_sr {
            return Ok(samples.to_vec());
        }
        if samples.is_empty() {
            return Ok(vec![]);
        }
        anyhow::ensure!(from_sr > 0 && to_sr > 0, "sample rates must be non-zero");

        let mut output = if samples.len() <= CHUNK_SIZE * 2 {
            Self::resample_single_pass(samples, from_sr, to_sr)?
        } else {
            Self::resample_chunked(samples, from_sr, to_sr)?
        };

        output.resize(Self::output_len(samples.len(), from_sr, to_sr), 0.0);
        Ok(output)
    }

    /// Length of `input_len` samples after conversion
    pub fn output_len(input_len: usize, from_sr: u32, to_sr: u32) -> usize {
        (input_len as f64 * to_sr as f64 / from_sr as f64).round() as usize
    }

    fn resample_single_pass(samples: &[f32], from_sr: u32, to_sr: u32) -> Result<Vec<f32>> {
        let params = Self::params(256, WindowFunction::BlackmanHarris2, SincInterpolationType::Linear);
        let mut resampler = SincFixedIn::<f32>::new(
            to_sr as f64 / from_sr as f64,
            2.0,
            params,
            samples.len(),
            1,
        )
        .context("Failed to create resampler")?;

        let output = resampler
            .process(&[samples][..], None)
            .context("Resampling failed")?;
        Ok(output.into_iter().next().unwrap_or_default())
    }

    fn resample_chunked(samples: &[f32], from_sr: u32, to_sr: u32) -> Result<Vec<f32>> {
        let params = Self::params(128, WindowFunction::Blackman2, SincInterpolationType::Quadratic);
        let ratio = to_sr as f64 / from_sr as f64;
        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, CHUNK_SIZE, 1)
            .context("Failed to create chunked resampler")?;

        let mut output = Vec::with_capacity((samples.len() as f64 * ratio * 1.1) as usize);

        let mut chunks = samples.chunks_exact(CHUNK_SIZE);
        for chunk in chunks.by_ref() {
            let out = resampler
                .process(&[chunk][..], None)
                .context("Chunked resampling failed")?;
            if let Some(channel) = out.into_iter().next() {
                output.extend(channel);
            }
        }

        let tail = chunks.remainder();
        if !tail.is_empty() {
            let out = resampler
                .process_partial(Some(&[tail][..]), None)
                .context("Resampling tail failed")?;
            if let Some(channel) = out.into_iter().next() {
                output.extend(channel);
            }
        }

        Ok(output)
    }

    fn params(
        sinc_len: usize,
        window: WindowFunction,
        interpolation: SincInterpolationType,
    ) -> SincInterpolationParameters {
        SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation,
            oversampling_factor: 256,
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, sr: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_same_rate_no_change() {
        let samples = sine(100, 16000);
        assert_eq!(Resampler::resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_empty_input() {
        assert!(Resampler::resample(&[], 44100, 16000).unwrap().is_empty());
    }

    #[test]
    fn test_short_clip_length_is_exact() {
        let samples = sine(2000, 48000);
        let out = Resampler::resample(&samples, 48000, 16000).unwrap();
        assert_eq!(out.len(), 667);
    }

    #[test]
    fn test_long_clip_length_is_exact() {
        let samples = sine(44100, 44100);
        let out = Resampler::resample(&samples, 44100, 16000).unwrap();
        assert_eq!(out.len(), 16000);
    }

    #[test]
    fn test_upsample_length() {
        let samples = sine(16000, 16000);
        let out = Resampler::resample(&samples, 16000, 40000).unwrap();
        assert_eq!(out.len(), 40000);
    }
}
