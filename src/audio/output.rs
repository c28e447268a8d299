//! Converted-audio persistence
//!
//! Files land in one shared directory as `<n>-<model>-<source>.wav`. Each
//! write rescans the directory under a mutex and takes one past the highest
//! prefix seen (or handed out), then creates the file exclusively so an
//! existing file is never truncated.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::core::error::{AudioOperation, Result, VcError};

fn pcm16_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn encode_pcm16<W: Write + Seek>(samples: &[f32], mut writer: hound::WavWriter<W>) -> hound::Result<()> {
    for &sample in samples {
        let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()
}

fn saving_error(path: &Path, e: hound::Error) -> VcError {
    VcError::Audio {
        message: format!("{:?}: {}", path, e),
        operation: AudioOperation::Saving,
    }
}

/// Write `samples` as 16-bit PCM mono WAV, replacing `path` if it exists
pub fn save_wav_pcm16<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
    let path = path.as_ref();
    let writer = hound::WavWriter::create(path, pcm16_spec(sample_rate)).map_err(|e| saving_error(path, e))?;
    encode_pcm16(samples, writer).map_err(|e| saving_error(path, e))
}

/// Leading decimal digits of a file name, if any
pub fn numeric_prefix(file_name: &str) -> Option<u64> {
    let digits: &str = {
        let end = file_name
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(file_name.len());
        &file_name[..end]
    };
    digits.parse().ok()
}

/// Highest numeric prefix among the entries of `dir` (0 when there is none)
pub fn scan_max_prefix(dir: &Path) -> Result<u64> {
    let mut max = 0;
    for entry in std::fs::read_dir(dir).map_err(|e| VcError::Io {
        message: format!("cannot list output directory: {}", e),
        path: Some(dir.to_path_buf()),
    })? {
        let entry = entry?;
        if let Some(n) = entry.file_name().to_str().and_then(numeric_prefix) {
            max = max.max(n);
        }
    }
    Ok(max)
}

/// File stem of `name`, falling back to the whole name
fn base_name(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}

/// Numbered WAV writer for one output directory
pub struct OutputWriter {
    dir: PathBuf,
    /// Last number handed out by this writer
    last: Mutex<Option<u64>>,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim the next free number by creating its file empty
    fn reserve(&self, model_name: &str, source_name: &str) -> Result<(PathBuf, File)> {
        std::fs::create_dir_all(&self.dir).map_err(|e| VcError::Io {
            message: format!("cannot create output directory: {}", e),
            path: Some(self.dir.clone()),
        })?;

        let mut last = self
            .last
            .lock()
            .map_err(|_| VcError::poisoned("OutputWriter::reserve"))?;
        loop {
            let next = scan_max_prefix(&self.dir)?.max(last.unwrap_or(0)) + 1;
            *last = Some(next);

            let path = self.dir.join(format!(
                "{}-{}-{}.wav",
                next,
                base_name(model_name),
                base_name(source_name)
            ));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("{:?} appeared during numbering, moving past it", path);
                }
                Err(e) => {
                    return Err(VcError::Io {
                        message: format!("cannot create output file: {}", e),
                        path: Some(path),
                    })
                }
            }
        }
    }

    /// Persist a converted waveform and return where it was written
    pub fn write(
        &self,
        samples: &[f32],
        sample_rate: u32,
        model_name: &str,
        source_name: &str,
    ) -> Result<PathBuf> {
        let (path, file) = self.reserve(model_name, source_name)?;
        let encoded = hound::WavWriter::new(BufWriter::new(file), pcm16_spec(sample_rate))
            .and_then(|writer| encode_pcm16(samples, writer));
        if let Err(e) = encoded {
            let _ = std::fs::remove_file(&path);
            return Err(saving_error(&path, e));
        }
        info!(
            "Wrote {:?} ({:.2}s at {} Hz)",
            path,
            samples.len() as f64 / sample_rate as f64,
            sample_rate
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(numeric_prefix("12-model-source.wav"), Some(12));
        assert_eq!(numeric_prefix("7abc.wav"), Some(7));
        assert_eq!(numeric_prefix("model.wav"), None);
        assert_eq!(numeric_prefix(""), None);
    }

    #[test]
    fn test_empty_directory_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("outputs");
        let writer = OutputWriter::new(&out);

        let path = writer.write(&[0.0; 160], 16000, "voice.pth", "/tmp/song.mp3").unwrap();
        assert_eq!(path, out.join("1-voice-song.wav"));
        assert!(path.exists());
    }

    #[test]
    fn test_continues_after_highest_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("3-foo-bar.wav"), b"").unwrap();
        std::fs::write(dir.path().join("7-baz-qux.wav"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let writer = OutputWriter::new(dir.path());
        let path = writer.write(&[0.0; 16], 16000, "model.pth", "clip.wav").unwrap();
        assert_eq!(path.file_name().unwrap(), "8-model-clip.wav");
        let path = writer.write(&[0.0; 16], 16000, "model.pth", "clip.wav").unwrap();
        assert_eq!(path.file_name().unwrap(), "9-model-clip.wav");
    }

    #[test]
    fn test_files_added_after_first_write_are_respected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path());
        let first = writer.write(&[0.0; 16], 16000, "m.pth", "s.wav").unwrap();
        assert_eq!(first.file_name().unwrap(), "1-m-s.wav");

        let external = dir.path().join("5-m-s.wav");
        std::fs::write(&external, b"keep me").unwrap();

        let names: Vec<_> = (0..4)
            .map(|_| {
                let path = writer.write(&[0.0; 16], 16000, "m.pth", "s.wav").unwrap();
                path.file_name().unwrap().to_string_lossy().into_owned()
            })
            .collect();
        assert_eq!(names, vec!["6-m-s.wav", "7-m-s.wav", "8-m-s.wav", "9-m-s.wav"]);
        assert_eq!(std::fs::read(&external).unwrap(), b"keep me");
    }

    #[test]
    fn test_numbers_never_go_backwards_after_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(dir.path());
        let first = writer.write(&[0.0; 16], 16000, "m.pth", "s.wav").unwrap();
        let second = writer.write(&[0.0; 16], 16000, "m.pth", "s.wav").unwrap();
        std::fs::remove_file(&first).unwrap();
        std::fs::remove_file(&second).unwrap();

        let third = writer.write(&[0.0; 16], 16000, "m.pth", "s.wav").unwrap();
        assert_eq!(third.file_name().unwrap(), "3-m-s.wav");
    }

    #[test]
    fn test_concurrent_writers_get_distinct_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(OutputWriter::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || writer.write(&[0.25; 64], 16000, "m.pth", "s.wav").unwrap())
            })
            .collect();
        let mut names: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        for name in &names {
            assert_eq!(hound::WavReader::open(name).unwrap().len(), 64);
        }
    }

    #[test]
    fn test_saved_wav_is_pcm16_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        save_wav_pcm16(&[0.5, -2.0, 1.0], 40000, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 40000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![16383, -32768, 32767]);
    }
}
