//! Pitch stage
//!
//! Extraction algorithms are external ([`PitchExtractor`]); this module owns
//! what happens to the curve afterwards: alignment to the feature frames,
//! semitone shift, manual override, and coarse quantization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::core::error::{Result, VcError};

/// Pitch frames per second (16 kHz input, hop 160)
pub const PITCH_FRAME_RATE: f32 = 100.0;

/// 16 kHz samples per pitch frame
pub const PITCH_HOP: usize = 160;

/// Lowest pitch mapped onto a voiced bin
pub const F0_MIN: f32 = 50.0;

/// Highest pitch mapped onto a voiced bin
pub const F0_MAX: f32 = 1100.0;

/// Pitch-extraction algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PitchMethod {
    Pm,
    #[default]
    Harvest,
    Dio,
    Crepe,
    MangioCrepe,
    Rmvpe,
}

impl PitchMethod {
    pub const ALL: [PitchMethod; 6] = [
        PitchMethod::Pm,
        PitchMethod::Harvest,
        PitchMethod::Dio,
        PitchMethod::Crepe,
        PitchMethod::MangioCrepe,
        PitchMethod::Rmvpe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PitchMethod::Pm => "pm",
            PitchMethod::Harvest => "harvest",
            PitchMethod::Dio => "dio",
            PitchMethod::Crepe => "crepe",
            PitchMethod::MangioCrepe => "mangio-crepe",
            PitchMethod::Rmvpe => "rmvpe",
        }
    }
}

impl FromStr for PitchMethod {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self> {
        PitchMethod::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| VcError::validation("f0_method", format!("unknown pitch method '{}'", s)))
    }
}

impl fmt::Display for PitchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// External pitch estimator
pub trait PitchExtractor: Send + Sync {
    /// Estimate pitch of 16 kHz mono `audio`.
    ///
    /// Returns Hz per 10 ms frame, 0 for unvoiced; ideally `frames` values,
    /// but the caller realigns whatever length comes back.
    fn extract(&self, audio: &[f32], method: PitchMethod, frames: usize) -> Result<Vec<f32>>;
}

/// Linearly resample a curve to `frames` points
pub fn resize_curve(curve: &[f32], frames: usize) -> Vec<f32> {
    if curve.len() == frames {
        return curve.to_vec();
    }
    if curve.is_empty() {
        return vec![0.0; frames];
    }
    if frames <= 1 || curve.len() == 1 {
        return vec![curve[0]; frames];
    }

    let scale = (curve.len() - 1) as f32 / (frames - 1) as f32;
    (0..frames)
        .map(|i| {
            let pos = i as f32 * scale;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(curve.len() - 1);
            let frac = pos - lo as f32;
            // Do not smear voiced values into unvoiced frames
            if curve[lo] == 0.0 || curve[hi] == 0.0 {
                if frac < 0.5 {
                    curve[lo]
                } else {
                    curve[hi]
                }
            } else {
                curve[lo] * (1.0 - frac) + curve[hi] * frac
            }
        })
        .collect()
}

/// Transpose by `semitones`
pub fn shift_pitch(f0: &mut [f32], semitones: i32) {
    if semitones == 0 {
        return;
    }
    let factor = 2f32.powf(semitones as f32 / 12.0);
    for v in f0.iter_mut() {
        *v *= factor;
    }
}

fn hz_to_mel(f: f32) -> f32 {
    1127.0 * (1.0 + f / 700.0).ln()
}

/// Quantize Hz onto bins 1..=255 (1 = unvoiced)
pub fn coarse_pitch(f0: &[f32]) -> Vec<u32> {
    let mel_min = hz_to_mel(F0_MIN);
    let mel_max = hz_to_mel(F0_MAX);
    f0.iter()
        .map(|&f| {
            let mut mel = hz_to_mel(f.max(0.0));
            if mel > 0.0 {
                mel = (mel - mel_min) * 254.0 / (mel_max - mel_min) + 1.0;
            }
            mel.clamp(1.0, 255.0).round() as u32
        })
        .collect()
}

/// Manually drawn pitch curve, `time_seconds,f0_hz` per line
#[derive(Debug, Clone, PartialEq)]
pub struct PitchCurve {
    points: Vec<(f32, f32)>,
}

impl PitchCurve {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VcError::validation("f0_file", format!("cannot read {:?}: {}", path, e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut points = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bad = || {
                VcError::validation(
                    "f0_file",
                    format!("line {}: expected 'time,f0', got '{}'", lineno + 1, line),
                )
            };
            let (t, f) = line.split_once(',').ok_or_else(bad)?;
            let t: f32 = t.trim().parse().map_err(|_| bad())?;
            let f: f32 = f.trim().parse().map_err(|_| bad())?;
            if !t.is_finite() || !f.is_finite() || t < 0.0 {
                return Err(bad());
            }
            points.push((t, f));
        }
        if points.is_empty() {
            return Err(VcError::validation("f0_file", "pitch curve file has no points"));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Sample the curve at pitch frame `frame`, holding end values outside it
    fn sample(&self, frame: f32) -> f32 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if frame <= first.0 * PITCH_FRAME_RATE {
            return first.1;
        }
        if frame >= last.0 * PITCH_FRAME_RATE {
            return last.1;
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = (pair[0].0 * PITCH_FRAME_RATE, pair[0].1);
            let (x1, y1) = (pair[1].0 * PITCH_FRAME_RATE, pair[1].1);
            if frame <= x1 {
                if x1 == x0 {
                    return y1;
                }
                return y0 + (y1 - y0) * (frame - x0) / (x1 - x0);
            }
        }
        last.1
    }

    /// Overwrite the leading frames of `f0` with the interpolated curve.
    ///
    /// The span covered is the curve's duration on the 100 fps grid.
    pub fn apply(&self, f0: &mut [f32]) {
        let first = self.points[0].0;
        let last = self.points[self.points.len() - 1].0;
        let span = ((last - first) * PITCH_FRAME_RATE + 1.0).round() as usize;
        for (i, v) in f0.iter_mut().take(span).enumerate() {
            *v = self.sample(i as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("mangio-crepe".parse::<PitchMethod>().unwrap(), PitchMethod::MangioCrepe);
        assert_eq!("rmvpe".parse::<PitchMethod>().unwrap(), PitchMethod::Rmvpe);
        let err = "yin".parse::<PitchMethod>().unwrap_err();
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_shift_octave() {
        let mut f0 = vec![220.0, 0.0];
        shift_pitch(&mut f0, 12);
        assert!((f0[0] - 440.0).abs() < 1e-3);
        assert_eq!(f0[1], 0.0);

        let mut f0 = vec![440.0];
        shift_pitch(&mut f0, 2);
        assert!((f0[0] - 493.883).abs() < 1e-2);
    }

    #[test]
    fn test_coarse_bounds() {
        let bins = coarse_pitch(&[0.0, F0_MIN, F0_MAX, 5000.0, 220.0]);
        assert_eq!(bins[0], 1);
        assert_eq!(bins[1], 1);
        assert_eq!(bins[2], 255);
        assert_eq!(bins[3], 255);
        assert!(bins[4] > 1 && bins[4] < 255);
    }

    #[test]
    fn test_resize_curve() {
        assert_eq!(resize_curve(&[1.0, 2.0, 3.0], 3), vec![1.0, 2.0, 3.0]);
        assert_eq!(resize_curve(&[100.0, 200.0], 3), vec![100.0, 150.0, 200.0]);
        assert_eq!(resize_curve(&[], 2), vec![0.0, 0.0]);
        assert_eq!(resize_curve(&[100.0, 0.0], 3), vec![100.0, 0.0, 0.0]);
    }

    #[test]
    fn test_curve_parse_and_apply() {
        let curve = PitchCurve::parse("0.0,100\n\n0.02, 300\n").unwrap();
        assert_eq!(curve.points().len(), 2);

        let mut f0 = vec![50.0; 5];
        curve.apply(&mut f0);
        assert_eq!(f0, vec![100.0, 200.0, 300.0, 50.0, 50.0]);
    }

    #[test]
    fn test_curve_parse_errors() {
        assert!(PitchCurve::parse("").is_err());
        assert!(PitchCurve::parse("0.1;200").is_err());
        assert!(PitchCurve::parse("abc,200").is_err());
    }
}
