//! Seamless looping of a buffer region with crossfades.
//!
//! A [`BufferLooperInstance`] is a two-voice polyphonic object. Every voice is
//! one [`BufferPlayerNode`] per channel multiplied by the voice envelope in a
//! [`GainNode`]. Each pass over the loop is one voice activation whose
//! envelope fades in, holds, and fades out by itself:
//!
//! ```text
//!  voice 0   /‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾\
//!  voice 1                    /‾‾‾‾‾‾‾‾‾‾‾‾‾\
//!  voice 0                                 /‾‾‾‾‾‾‾‾‾‾‾‾‾\
//! ```
//!
//! The first pass plays from `start_ms`; later passes play from
//! `loop_start_ms`. A pass ends at `loop_end_ms`, and its fade-out overlaps
//! the fade-in of the next pass. The next pass is started when the pool
//! reports that the previous one began releasing, so
//! [`update`](BufferLooperInstance::update) must be called regularly on the
//! control thread, like [`PolyphonicObjectInstance::reclaim`].

use crossbeam_channel::Receiver;
use strata_core::{
    AudioObjectInstance, EnvelopeShape, GraphError, NodeManager, ObjectError, OutputRef,
    PolyphonicObject, PolyphonicObjectInstance, SafeOwner, SmoothedValueHandle, VoiceContext,
    VoiceGraph, VoiceId,
};

use crate::buffer_player::{AudioBuffer, BufferPlayerControl, BufferPlayerNode};
use crate::gain::GainNode;

/// Overlapping passes never exceed two.
const LOOPER_VOICES: usize = 2;

/// Looper settings.
#[derive(Debug, Clone)]
pub struct BufferLooper {
    /// Data to loop.
    pub buffer: AudioBuffer,
    /// Output channels. Buffer channels repeat when there are fewer.
    pub channel_count: usize,
    /// Length of the fade between passes, in buffer milliseconds.
    pub crossfade_ms: f32,
    /// Where the first pass starts.
    pub start_ms: f32,
    /// Where every later pass starts.
    pub loop_start_ms: f32,
    /// Where every pass ends. `0.0` means the end of the buffer.
    pub loop_end_ms: f32,
    /// Pitch shift in semitones; playback speed follows.
    pub transpose: f32,
    /// Keep chaining passes. When off, one pass plays and fades out.
    pub looping: bool,
    /// Start the first pass as soon as the instance exists.
    pub auto_play: bool,
}

impl BufferLooper {
    /// Loop over the whole of `buffer` with a one second crossfade.
    pub fn new(buffer: AudioBuffer) -> Self {
        Self {
            channel_count: buffer.channel_count().max(1),
            buffer,
            crossfade_ms: 1000.0,
            start_ms: 0.0,
            loop_start_ms: 0.0,
            loop_end_ms: 0.0,
            transpose: 0.0,
            looping: true,
            auto_play: true,
        }
    }

    /// Playback speed implied by `transpose`.
    pub fn speed(&self) -> f32 {
        libm::powf(2.0, self.transpose / 12.0)
    }

    fn invalid(name: &str, parameter: &'static str, reason: String) -> ObjectError {
        ObjectError::InvalidParameter {
            object: name.to_string(),
            name: parameter,
            reason,
        }
    }

    /// Validate the settings and derive the two pass shapes.
    fn passes(&self, name: &str) -> Result<Passes, ObjectError> {
        if self.buffer.frames() == 0 || self.buffer.sample_rate() <= 0.0 {
            return Err(Self::invalid(name, "buffer", "buffer is empty".into()));
        }
        let duration_ms = self.buffer.frames() as f32 * 1000.0 / self.buffer.sample_rate();
        if !self.transpose.is_finite() {
            return Err(Self::invalid(
                name,
                "transpose",
                format!("{} is not a number of semitones", self.transpose),
            ));
        }
        if self.crossfade_ms.is_nan() || self.crossfade_ms < 0.0 {
            return Err(Self::invalid(
                name,
                "crossfade_ms",
                format!("{} must not be negative", self.crossfade_ms),
            ));
        }

        let loop_end = if self.loop_end_ms > 0.0 {
            self.loop_end_ms
        } else {
            duration_ms
        };
        if loop_end > duration_ms {
            return Err(Self::invalid(
                name,
                "loop_end_ms",
                format!("{loop_end} is past the end of the buffer ({duration_ms} ms)"),
            ));
        }
        if !(0.0..loop_end).contains(&self.start_ms) {
            return Err(Self::invalid(
                name,
                "start_ms",
                format!("{} is not before the loop end {loop_end}", self.start_ms),
            ));
        }
        if !(0.0..loop_end).contains(&self.loop_start_ms) {
            return Err(Self::invalid(
                name,
                "loop_start_ms",
                format!("{} is not before the loop end {loop_end}", self.loop_start_ms),
            ));
        }

        // Each pass fades in and out within its own span.
        let fades = 2.0 * self.crossfade_ms;
        let first_span = loop_end - self.start_ms;
        let loop_span = loop_end - self.loop_start_ms;
        if first_span < fades || (self.looping && loop_span < fades) {
            return Err(Self::invalid(
                name,
                "crossfade_ms",
                format!(
                    "{} ms crossfade does not fit twice into the loop",
                    self.crossfade_ms
                ),
            ));
        }

        let speed = self.speed();
        let shape = |span: f32| {
            let fade = self.crossfade_ms / speed;
            EnvelopeShape::new(fade, 0.0, 1.0, fade).with_hold((span - fades) / speed)
        };
        let frames_per_ms = f64::from(self.buffer.sample_rate()) / 1000.0;
        Ok(Passes {
            first_position: f64::from(self.start_ms) * frames_per_ms,
            loop_position: f64::from(self.loop_start_ms) * frames_per_ms,
            first: shape(first_span),
            looped: shape(loop_span),
            speed,
        })
    }
}

/// Where and how long each pass plays.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Passes {
    first_position: f64,
    loop_position: f64,
    first: EnvelopeShape,
    looped: EnvelopeShape,
    speed: f32,
}

/// Nodes of one looper voice.
pub struct LooperVoice {
    players: Vec<SafeOwner<BufferPlayerControl>>,
    _gains: Vec<SafeOwner<SmoothedValueHandle>>,
}

impl LooperVoice {
    fn build(
        ctx: &VoiceContext<'_>,
        buffer: &AudioBuffer,
        channel_count: usize,
    ) -> Result<VoiceGraph<Self>, ObjectError> {
        let mut players = Vec::with_capacity(channel_count);
        let mut gains = Vec::with_capacity(channel_count);
        let mut outputs = Vec::with_capacity(channel_count);
        for channel in 0..channel_count {
            let source_channel = channel % buffer.channel_count().max(1);
            let (node, control) = BufferPlayerNode::new(buffer.clone(), source_channel);
            let player = ctx.manager.register_with(node, control)?;

            let (node, handle) = GainNode::new(2, 1.0);
            let gain = ctx.manager.register_with(node, handle)?;
            ctx.manager.connect(player.output(0), gain.input(0))?;
            ctx.manager.connect(ctx.envelope, gain.input(1))?;

            outputs.push(gain.output(0));
            players.push(player);
            gains.push(gain);
        }
        Ok(VoiceGraph {
            outputs,
            payload: Self {
                players,
                _gains: gains,
            },
        })
    }
}

/// Live looper.
pub struct BufferLooperInstance {
    pool: PolyphonicObjectInstance<LooperVoice>,
    passes: Passes,
    looping: bool,
    released: Receiver<VoiceId>,
    current: Option<VoiceId>,
}

impl BufferLooperInstance {
    /// Build both voices and start playing if `settings.auto_play` is set.
    pub fn init(
        settings: BufferLooper,
        name: impl Into<String>,
        manager: &NodeManager,
    ) -> Result<Self, ObjectError> {
        let name = name.into();
        let passes = settings.passes(&name)?;
        let channel_count = settings.channel_count;
        let buffer = settings.buffer.clone();
        let mut pool = PolyphonicObjectInstance::init(
            PolyphonicObject::new(LOOPER_VOICES, channel_count),
            name,
            manager,
            &|ctx: &VoiceContext<'_>| LooperVoice::build(ctx, &buffer, channel_count),
        )?;

        let (tx, released) = crossbeam_channel::bounded(LOOPER_VOICES * 2);
        pool.on_voice_released(move |id| {
            let _ = tx.try_send(id);
        });

        let mut instance = Self {
            pool,
            passes,
            looping: settings.looping,
            released,
            current: None,
        };
        if settings.auto_play {
            instance.start()?;
        }
        Ok(instance)
    }

    /// Start from `start_ms`, fading out whatever pass is playing.
    pub fn start(&mut self) -> Result<(), GraphError> {
        if let Some(id) = self.current.take() {
            self.pool.release(id);
        }
        self.play_pass(true)
    }

    /// Fade out the current pass and start no further ones.
    pub fn stop(&mut self) {
        if let Some(id) = self.current.take() {
            self.pool.release(id);
        }
    }

    /// Whether a pass is playing or will be chained.
    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Chain the next pass when the current one started fading out, and
    /// reclaim finished voices. Call regularly from the control thread.
    pub fn update(&mut self) -> Result<(), GraphError> {
        self.pool.poll_events();
        while let Ok(id) = self.released.try_recv() {
            if self.current != Some(id) {
                continue;
            }
            if self.looping {
                self.play_pass(false)?;
            } else {
                tracing::debug!("buffer looper '{}' finished its pass", self.pool.name());
                self.current = None;
            }
        }
        self.pool.reclaim();
        Ok(())
    }

    fn play_pass(&mut self, first: bool) -> Result<(), GraphError> {
        let (position, shape) = if first {
            (self.passes.first_position, self.passes.first)
        } else {
            (self.passes.loop_position, self.passes.looped)
        };
        let speed = self.passes.speed;
        let id = self.pool.play(shape, |voice| {
            for player in &voice.players {
                player.play(position, speed);
            }
        })?;
        self.current = Some(id);
        Ok(())
    }

    /// Voices currently sounding or waiting to be reclaimed.
    pub fn busy_voice_count(&self) -> usize {
        self.pool.busy_voice_count()
    }
}

impl AudioObjectInstance for BufferLooperInstance {
    fn name(&self) -> &str {
        self.pool.name()
    }

    fn channel_count(&self) -> usize {
        self.pool.channel_count()
    }

    fn output_for_channel(&self, channel: usize) -> Option<OutputRef> {
        self.pool.output_for_channel(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::EngineConfig;

    fn buffer(frames: usize) -> AudioBuffer {
        AudioBuffer::new(vec![vec![1.0; frames]], 1000.0)
    }

    fn looper(frames: usize) -> BufferLooper {
        BufferLooper {
            crossfade_ms: 10.0,
            auto_play: false,
            ..BufferLooper::new(buffer(frames))
        }
    }

    #[test]
    fn zero_loop_end_means_the_whole_buffer() {
        let passes = looper(100).passes("looper").unwrap();
        assert_eq!(passes.first, EnvelopeShape::new(10.0, 0.0, 1.0, 10.0).with_hold(80.0));
        assert_eq!(passes.first, passes.looped);
        assert_eq!(passes.loop_position, 0.0);
    }

    #[test]
    fn first_pass_and_loop_differ_in_start_and_length() {
        let settings = BufferLooper {
            start_ms: 10.0,
            loop_start_ms: 40.0,
            loop_end_ms: 90.0,
            ..looper(100)
        };
        let passes = settings.passes("looper").unwrap();
        assert_eq!(passes.first.hold_ms, Some(60.0));
        assert_eq!(passes.looped.hold_ms, Some(30.0));
        assert_eq!(passes.first_position, 10.0);
        assert_eq!(passes.loop_position, 40.0);
    }

    #[test]
    fn an_octave_up_plays_twice_as_fast() {
        let settings = BufferLooper {
            transpose: 12.0,
            ..looper(100)
        };
        let passes = settings.passes("looper").unwrap();
        assert!((passes.speed - 2.0).abs() < 1e-6);
        assert_eq!(passes.first.attack_ms, 5.0);
        assert_eq!(passes.first.hold_ms, Some(40.0));
    }

    #[test]
    fn crossfade_must_fit_into_the_loop() {
        let settings = BufferLooper {
            loop_start_ms: 90.0,
            ..looper(100)
        };
        assert!(matches!(
            settings.passes("looper"),
            Err(ObjectError::InvalidParameter {
                name: "crossfade_ms",
                ..
            })
        ));

        // A single pass only needs room for its own fades.
        let once = BufferLooper {
            looping: false,
            ..settings
        };
        assert!(once.passes("looper").is_ok());
    }

    #[test]
    fn loop_points_must_lie_in_the_buffer() {
        let past_end = BufferLooper {
            loop_end_ms: 150.0,
            ..looper(100)
        };
        assert!(matches!(
            past_end.passes("looper"),
            Err(ObjectError::InvalidParameter {
                name: "loop_end_ms",
                ..
            })
        ));

        let late_start = BufferLooper {
            start_ms: 100.0,
            ..looper(100)
        };
        assert!(matches!(
            late_start.passes("looper"),
            Err(ObjectError::InvalidParameter {
                name: "start_ms",
                ..
            })
        ));
    }

    #[test]
    fn stop_fades_out_and_ends_the_loop() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 10, 1));
        let mut looper = BufferLooperInstance::init(looper(100), "looper", &manager).unwrap();
        manager
            .route(0, looper.output_for_channel(0).unwrap())
            .unwrap();

        looper.start().unwrap();
        let mut out = [0.0f32; 10];
        processor.process(&mut out);
        processor.process(&mut out);
        assert!(out.iter().all(|&s| (s - 1.0).abs() < 1e-4));

        looper.stop();
        assert!(!looper.is_playing());
        processor.process(&mut out);
        assert!(out[9].abs() < 1e-6);
        looper.update().unwrap();
        assert_eq!(looper.busy_voice_count(), 0);

        processor.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn without_looping_one_pass_plays() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 10, 1));
        let settings = BufferLooper {
            looping: false,
            auto_play: true,
            ..looper(40)
        };
        let mut looper = BufferLooperInstance::init(settings, "once", &manager).unwrap();
        manager
            .route(0, looper.output_for_channel(0).unwrap())
            .unwrap();

        let mut out = [0.0f32; 10];
        for _ in 0..4 {
            processor.process(&mut out);
            looper.update().unwrap();
        }
        assert!(!looper.is_playing());
        assert!(out[9].abs() < 1e-6);

        processor.process(&mut out);
        looper.update().unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(looper.busy_voice_count(), 0);
    }
}
