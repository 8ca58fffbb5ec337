//! Playback of in-memory multichannel audio.
//!
//! [`AudioBuffer`] is immutable, reference-counted sample data. A
//! [`BufferPlayerNode`] plays one channel of it with variable speed and
//! linear interpolation, resampling from the buffer's rate to the engine
//! rate. Play and stop requests arrive over a bounded queue drained at the
//! top of each block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use strata_core::{
    AudioObject, AudioObjectInstance, MultiChannelObject, MultiChannelObjectInstance, Node,
    NodeManager, ObjectError, ObjectInputs, ProcessContext, SafeOwner,
};

const PLAYER_QUEUE_DEPTH: usize = 16;

/// Shared, immutable multichannel sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Arc<[Vec<f32>]>,
    sample_rate: f32,
}

impl AudioBuffer {
    /// Buffer from per-channel sample vectors. Channels are truncated to the
    /// shortest one.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: f32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(frames);
        }
        Self {
            channels: channels.into(),
            sample_rate,
        }
    }

    /// Build from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: f32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let channels = (0..channel_count)
            .map(|c| (0..frames).map(|f| samples[f * channel_count + c]).collect())
            .collect();
        Self::new(channels, sample_rate)
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Sample rate the data was recorded at.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate > 0.0 {
            self.frames() as f32 / self.sample_rate
        } else {
            0.0
        }
    }

    /// Samples of channel `index`.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Interleave all channels into one vector.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let channels = self.channel_count();
        let mut out = Vec::with_capacity(self.frames() * channels);
        for frame in 0..self.frames() {
            for channel in self.channels.iter() {
                out.push(channel[frame]);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayerMessage {
    Play { start: f64, speed: f32 },
    Stop,
}

/// Control surface of a [`BufferPlayerNode`].
#[derive(Debug, Clone)]
pub struct BufferPlayerControl {
    messages: Sender<PlayerMessage>,
    playing: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
}

impl BufferPlayerControl {
    /// Start playing at frame `start` (fractional) with `speed` (1.0 = original
    /// pitch). Returns `false` when the queue is full.
    pub fn play(&self, start: f64, speed: f32) -> bool {
        self.send(PlayerMessage::Play { start, speed })
    }

    /// Stop playback. Returns `false` when the queue is full.
    pub fn stop(&self) -> bool {
        self.send(PlayerMessage::Stop)
    }

    fn send(&self, message: PlayerMessage) -> bool {
        match self.messages.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                tracing::warn!("buffer player queue full, dropping {message:?}");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Whether the node was playing at the end of the last block.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Read position in buffer frames at the end of the last block.
    pub fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Acquire))
    }
}

/// Plays one channel of an [`AudioBuffer`].
pub struct BufferPlayerNode {
    buffer: AudioBuffer,
    channel: usize,
    messages: Receiver<PlayerMessage>,
    playing_flag: Arc<AtomicBool>,
    position_bits: Arc<AtomicU64>,
    playing: bool,
    position: f64,
    speed: f32,
    /// Buffer rate over engine rate.
    rate_ratio: f64,
}

impl BufferPlayerNode {
    /// Stopped player for `channel` of `buffer`.
    pub fn new(buffer: AudioBuffer, channel: usize) -> (Self, BufferPlayerControl) {
        let (tx, rx) = crossbeam_channel::bounded(PLAYER_QUEUE_DEPTH);
        let playing = Arc::new(AtomicBool::new(false));
        let position = Arc::new(AtomicU64::new(0.0f64.to_bits()));
        let rate_ratio = f64::from(buffer.sample_rate()) / 48000.0;
        let node = Self {
            buffer,
            channel,
            messages: rx,
            playing_flag: Arc::clone(&playing),
            position_bits: Arc::clone(&position),
            playing: false,
            position: 0.0,
            speed: 1.0,
            rate_ratio,
        };
        let control = BufferPlayerControl {
            messages: tx,
            playing,
            position,
        };
        (node, control)
    }
}

impl Node for BufferPlayerNode {
    fn name(&self) -> &'static str {
        "buffer_player"
    }

    fn output_count(&self) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        for _ in 0..PLAYER_QUEUE_DEPTH {
            match self.messages.try_recv() {
                Ok(PlayerMessage::Play { start, speed }) => {
                    self.position = start.max(0.0);
                    self.speed = speed;
                    self.playing = true;
                }
                Ok(PlayerMessage::Stop) => self.playing = false,
                Err(_) => break,
            }
        }

        let data = self.buffer.channel(self.channel).unwrap_or(&[]);
        let frames = data.len();
        let increment = f64::from(self.speed) * self.rate_ratio;

        let end = frames as f64;
        if self.position >= end {
            self.playing = false;
        }

        for out in ctx.output(0).iter_mut() {
            if !self.playing {
                *out = 0.0;
                continue;
            }
            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let a = data[index];
            let b = data.get(index + 1).copied().unwrap_or(0.0);
            *out = a + (b - a) * frac;
            self.position += increment;
            if self.position < 0.0 || self.position >= end {
                self.playing = false;
            }
        }

        self.playing_flag.store(self.playing, Ordering::Release);
        self.position_bits
            .store(self.position.to_bits(), Ordering::Release);
    }

    fn sample_rate_changed(&mut self, sample_rate: f32) {
        self.rate_ratio = f64::from(self.buffer.sample_rate()) / f64::from(sample_rate);
    }
}

/// Plays every channel of a buffer, one node per channel.
#[derive(Debug, Clone)]
pub struct BufferPlayer {
    /// Data to play.
    pub buffer: AudioBuffer,
    /// Start playing from the beginning as soon as the nodes exist.
    pub auto_play: bool,
    /// Playback speed.
    pub speed: f32,
}

impl BufferPlayer {
    /// Player starting automatically at normal speed.
    pub fn new(buffer: AudioBuffer) -> Self {
        Self {
            buffer,
            auto_play: true,
            speed: 1.0,
        }
    }
}

impl MultiChannelObject for BufferPlayer {
    type Control = BufferPlayerControl;

    fn channel_count(&self) -> usize {
        self.buffer.channel_count()
    }

    fn create_node(
        &self,
        channel: usize,
        manager: &NodeManager,
        _inputs: &ObjectInputs,
    ) -> Result<SafeOwner<BufferPlayerControl>, ObjectError> {
        let source_channel = channel % self.buffer.channel_count().max(1);
        let (node, control) = BufferPlayerNode::new(self.buffer.clone(), source_channel);
        if self.auto_play {
            control.play(0.0, self.speed);
        }
        Ok(manager.register_with(node, control)?)
    }
}

impl AudioObject for BufferPlayer {
    fn instantiate(
        &self,
        name: &str,
        manager: &NodeManager,
        inputs: &[&dyn AudioObjectInstance],
    ) -> Result<Box<dyn AudioObjectInstance>, ObjectError> {
        let instance = MultiChannelObjectInstance::init(self.clone(), name, manager, inputs)?;
        Ok(Box::new(instance))
    }
}
