//! Source audio decoding
//!
//! WAV goes through hound; MP3, FLAC, OGG and the rest through symphonia.
//! Every clip is downmixed to mono and resampled to the requested rate.

use anyhow::{Context, Result as AnyResult};
use std::fs::File;
use std::path::Path;
use tracing::debug;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::Resampler;
use crate::core::error::{AudioOperation, Result, VcError};

/// Decoded interleaved samples before downmixing
struct Decoded {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

/// Audio file loader
pub struct AudioLoader;

impl AudioLoader {
    /// Decode `path` to mono `f32` samples at `target_sr`
    pub fn load_mono<P: AsRef<Path>>(path: P, target_sr: u32) -> Result<Vec<f32>> {
        let path = path.as_ref();
        let decoded = Self::decode(path).map_err(|e| VcError::Audio {
            message: format!("{:?}: {:#}", path, e),
            operation: AudioOperation::Loading,
        })?;

        let sample_rate = decoded.sample_rate;
        let mono = downmix(decoded.samples, decoded.channels);
        debug!(
            "Decoded {:?}: {} samples at {} Hz",
            path,
            mono.len(),
            sample_rate
        );

        Resampler::resample(&mono, sample_rate, target_sr).map_err(|e| VcError::Audio {
            message: format!("{} Hz -> {} Hz: {:#}", sample_rate, target_sr, e),
            operation: AudioOperation::Resampling,
        })
    }

    fn decode(path: &Path) -> AnyResult<Decoded> {
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("wav")) {
            Self::decode_wav(path)
        } else {
            Self::decode_with_symphonia(path)
        }
    }

    fn decode_wav(path: &Path) -> AnyResult<Decoded> {
        let reader = hound::WavReader::open(path).context("Failed to open WAV file")?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .context("Corrupt WAV data")?,
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_value))
                    .collect::<std::result::Result<_, _>>()
                    .context("Corrupt WAV data")?
            }
        };

        Ok(Decoded {
            samples,
            channels: spec.channels as usize,
            sample_rate: spec.sample_rate,
        })
    }

    fn decode_with_symphonia(path: &Path) -> AnyResult<Decoded> {
        let src = File::open(path).with_context(|| format!("Failed to open audio file: {:?}", path))?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .with_context(|| format!("Unsupported audio format: {:?}", path))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow::anyhow!("No supported audio tracks found"))?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| anyhow::anyhow!("Unknown sample rate"))?;
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Unsupported codec")?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let buf = sample_buf.get_or_insert_with(|| {
                        SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                // Skip corrupted packets
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(anyhow::anyhow!("Decode error: {}", e)),
            }
        }

        Ok(Decoded {
            samples,
            channels,
            sample_rate,
        })
    }
}

/// Average interleaved channels into one
fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
