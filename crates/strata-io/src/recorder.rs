//! Streaming capture output into a WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::WavWriter;
use strata_nodes::CaptureInstance;

use crate::wav::{WavSpec, check_spec, write_samples};
use crate::{Error, Result};

/// Writes captured channels to a WAV file as they arrive.
///
/// Channels are interleaved frame by frame. When one channel has delivered
/// more samples than another, the surplus is held back until the others catch
/// up, so the file never drifts out of alignment.
pub struct WavRecorder {
    writer: WavWriter<BufWriter<File>>,
    spec: WavSpec,
    pending: Vec<Vec<f32>>,
    scratch: Vec<f32>,
    frames: u64,
}

impl WavRecorder {
    /// Create (or truncate) `path` for recording with `spec`.
    pub fn create<P: AsRef<Path>>(path: P, spec: WavSpec) -> Result<Self> {
        check_spec(spec)?;
        let writer = WavWriter::create(path, hound::WavSpec::from(spec))?;
        Ok(Self {
            writer,
            spec,
            pending: vec![Vec::new(); usize::from(spec.channels.max(1))],
            scratch: Vec::new(),
            frames: 0,
        })
    }

    /// Drain `capture` and write every complete frame. Returns the number of
    /// frames written.
    pub fn record(&mut self, capture: &CaptureInstance) -> Result<usize> {
        self.write_channels(capture.drain())
    }

    /// Append per-channel samples and write every complete frame. Returns the
    /// number of frames written.
    pub fn write_channels(&mut self, channels: Vec<Vec<f32>>) -> Result<usize> {
        if channels.len() != self.pending.len() {
            return Err(Error::ChannelMismatch {
                expected: self.pending.len(),
                found: channels.len(),
            });
        }
        for (pending, samples) in self.pending.iter_mut().zip(channels) {
            pending.extend_from_slice(&samples);
        }

        let frames = self.pending.iter().map(Vec::len).min().unwrap_or(0);
        if frames == 0 {
            return Ok(0);
        }
        self.scratch.clear();
        for frame in 0..frames {
            for pending in &self.pending {
                self.scratch.push(pending[frame]);
            }
        }
        write_samples(&mut self.writer, &self.scratch, self.spec.bits_per_sample)?;
        for pending in &mut self.pending {
            pending.drain(..frames);
        }
        self.frames += frames as u64;
        Ok(frames)
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Samples held back waiting for the slowest channel.
    pub fn pending_samples(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }

    /// Flush and close the file. Held-back samples are discarded. Returns the
    /// total frame count.
    pub fn finalize(self) -> Result<u64> {
        if self.pending_samples() > 0 {
            tracing::warn!(
                samples = self.pending_samples(),
                "discarding unaligned samples at end of recording"
            );
        }
        self.writer.finalize()?;
        tracing::debug!(frames = self.frames, "recording finalized");
        Ok(self.frames)
    }
}
