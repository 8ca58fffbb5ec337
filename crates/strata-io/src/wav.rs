//! WAV file reading and writing.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::io::{Read, Seek, Write};
use std::path::Path;
use strata_nodes::AudioBuffer;

/// WAV audio encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    /// Linear PCM (integer samples).
    Pcm,
    /// IEEE 754 floating-point samples.
    IeeeFloat,
}

/// WAV file metadata extracted without loading sample data.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Total number of sample frames (samples per channel).
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Audio encoding format.
    pub format: WavFormat,
}

/// Read WAV metadata without loading sample data.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let total_samples = u64::from(reader.len());
    let num_frames = total_samples / u64::from(spec.channels.max(1));
    let duration_secs = num_frames as f64 / f64::from(spec.sample_rate);

    let format = match spec.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        num_frames,
        duration_secs,
        format,
    })
}

/// WAV file specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: u32,
    /// Bit depth per sample: 16 or 24 for PCM, 32 for float.
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: if spec.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Read every sample of an open file as f32, interleaved.
fn read_samples<R: Read>(reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    match spec.sample_format {
        SampleFormat::Float => Ok(reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?),
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if bits == 0 || bits > 32 {
                return Err(Error::UnsupportedFormat(format!("{bits}-bit PCM")));
            }
            let max_val = (1i64 << (bits - 1)) as f32;
            Ok(reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?)
        }
    }
}

/// Read a WAV file into a multichannel [`AudioBuffer`].
///
/// Integer PCM is scaled to `-1.0..1.0`. The buffer carries the file's sample
/// rate; a buffer player resamples it to the engine rate.
///
/// # Example
/// ```ignore
/// let (buffer, spec) = read_wav("loop.wav")?;
/// println!("{} channels, {} frames at {} Hz", buffer.channel_count(), buffer.frames(), spec.sample_rate);
/// ```
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(AudioBuffer, WavSpec)> {
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());
    let samples = read_samples(reader)?;
    let buffer =
        AudioBuffer::from_interleaved(&samples, usize::from(spec.channels), spec.sample_rate as f32);
    Ok((buffer, spec))
}

/// Append interleaved samples to an open writer, converting to its format.
pub(crate) fn write_samples<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    samples: &[f32],
    bits_per_sample: u16,
) -> Result<()> {
    if bits_per_sample == 32 {
        for &sample in samples {
            writer.write_sample(sample)?;
        }
    } else {
        let max_val = (1i32 << (bits_per_sample - 1)) as f32;
        for &sample in samples {
            let int_sample = (sample * max_val).clamp(-max_val, max_val - 1.0) as i32;
            writer.write_sample(int_sample)?;
        }
    }
    Ok(())
}

/// Reject bit depths hound cannot write for our sample types.
pub(crate) fn check_spec(spec: WavSpec) -> Result<()> {
    match spec.bits_per_sample {
        16 | 24 | 32 => Ok(()),
        bits => Err(Error::UnsupportedFormat(format!("{bits}-bit output"))),
    }
}

/// Write interleaved samples to a WAV file.
///
/// `samples.len()` must be a multiple of `spec.channels`.
///
/// # Example
/// ```ignore
/// let samples = vec![0.0f32; 48000 * 2]; // 1 second of stereo silence
/// let spec = WavSpec { channels: 2, sample_rate: 48000, ..Default::default() };
/// write_wav("output.wav", &samples, spec)?;
/// ```
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], spec: WavSpec) -> Result<()> {
    check_spec(spec)?;
    let channels = usize::from(spec.channels.max(1));
    if samples.len() % channels != 0 {
        return Err(Error::ChannelMismatch {
            expected: channels,
            found: samples.len() % channels,
        });
    }

    let mut writer = WavWriter::create(path, hound::WavSpec::from(spec))?;
    write_samples(&mut writer, samples, spec.bits_per_sample)?;
    writer.finalize()?;
    Ok(())
}

/// Write an [`AudioBuffer`] with its own channel count and sample rate.
pub fn write_buffer<P: AsRef<Path>>(
    path: P,
    buffer: &AudioBuffer,
    bits_per_sample: u16,
) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.channel_count() as u16,
        sample_rate: buffer.sample_rate() as u32,
        bits_per_sample,
    };
    write_wav(path, &buffer.to_interleaved(), spec)
}
