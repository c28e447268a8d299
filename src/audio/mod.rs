//! Audio I/O
//!
//! - Source decoding (WAV, MP3, FLAC, OGG) to mono at a fixed rate
//! - Sample-rate conversion
//! - Numbered WAV output

mod loader;
mod output;
mod resampler;

pub use loader::AudioLoader;
pub use output::{numeric_prefix, save_wav_pcm16, scan_max_prefix, OutputWriter};
pub use resampler::Resampler;
