//! Linear ADSR envelope generator with completion notification.
//!
//! The envelope is an ordinary node with one output carrying its level. It is
//! driven by [`EnvelopeMessage`]s sent from the control thread through a
//! bounded queue that the node drains at the top of every block.
//!
//! When the release phase reaches zero the node pushes an
//! [`EnvelopeCompletion`] into its [`CompletionNotifier`] queue. A shape with
//! a hold time also leaves the sustain segment on its own and reports that
//! too. Pushing records is the only thing it does on the audio thread;
//! whoever owns the receiving end (normally a polyphonic object) reacts on
//! the control thread.
//!
//! ```text
//!  level
//!   1 ┤   /\
//!     │  /  \______
//!   s ┤ /          \
//!     │/            \
//!   0 ┼──────────────┴──> time
//!      A  D   S     R
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::node::{Node, ProcessContext};
use crate::smoothing::ms_to_samples;

/// Messages a control thread may queue per envelope between two blocks.
pub const ENVELOPE_QUEUE_DEPTH: usize = 32;

/// Segment timings and sustain level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    /// Attack time in milliseconds.
    pub attack_ms: f32,
    /// Decay time in milliseconds.
    pub decay_ms: f32,
    /// Sustain level, clamped to `0.0..=1.0`.
    pub sustain: f32,
    /// Release time in milliseconds.
    pub release_ms: f32,
    /// Sustain duration in milliseconds. `None` holds until released.
    pub hold_ms: Option<f32>,
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        Self {
            attack_ms: 5.0,
            decay_ms: 50.0,
            sustain: 0.8,
            release_ms: 200.0,
            hold_ms: None,
        }
    }
}

impl EnvelopeShape {
    /// Shape with the given segment times and sustain level.
    pub fn new(attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) -> Self {
        Self {
            attack_ms,
            decay_ms,
            sustain,
            release_ms,
            hold_ms: None,
        }
    }

    /// Same shape, releasing by itself after sustaining for `hold_ms`.
    pub fn with_hold(mut self, hold_ms: f32) -> Self {
        self.hold_ms = Some(hold_ms);
        self
    }
}

/// Envelope segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvelopeStage {
    /// Silent, waiting for a trigger.
    #[default]
    Idle = 0,
    /// Rising to full level.
    Attack = 1,
    /// Falling to the sustain level.
    Decay = 2,
    /// Holding the sustain level.
    Sustain = 3,
    /// Falling to zero after a release.
    Release = 4,
}

impl EnvelopeStage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Attack,
            2 => Self::Decay,
            3 => Self::Sustain,
            4 => Self::Release,
            _ => Self::Idle,
        }
    }
}

/// Control → audio envelope commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeMessage {
    /// Start the attack from the current level. `activation` is echoed in the
    /// completion notification.
    Trigger {
        /// Segment timings.
        shape: EnvelopeShape,
        /// Caller-chosen stamp identifying this activation.
        activation: u64,
    },
    /// Enter the release segment.
    Release,
    /// Drop to zero immediately, without notification.
    Stop,
}

/// Notification that an envelope left a segment on its own.
///
/// `segment` is [`EnvelopeStage::Release`] when the level reached zero and
/// [`EnvelopeStage::Sustain`] when a held sustain ran out and the release
/// started. Releases requested through [`EnvelopeMessage::Release`] are not
/// reported when they start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeCompletion {
    /// Identifier given to the notifier (a voice index for polyphony).
    pub id: usize,
    /// Activation stamp of the trigger that just finished.
    pub activation: u64,
    /// Segment that ended.
    pub segment: EnvelopeStage,
}

/// Sending end for completion notifications.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    sender: Sender<EnvelopeCompletion>,
    id: usize,
}

impl CompletionNotifier {
    /// Notifier reporting completions as `id` on `sender`.
    pub fn new(sender: Sender<EnvelopeCompletion>, id: usize) -> Self {
        Self { sender, id }
    }
}

#[derive(Debug, Default)]
struct EnvelopeShared {
    level: AtomicU32,
    stage: AtomicU8,
    dropped: AtomicU32,
}

/// Control-thread side of an [`EnvelopeNode`].
#[derive(Debug, Clone)]
pub struct EnvelopeControl {
    messages: Sender<EnvelopeMessage>,
    shared: Arc<EnvelopeShared>,
}

impl EnvelopeControl {
    /// Queue a trigger with activation stamp 0.
    pub fn trigger(&self, shape: EnvelopeShape) -> bool {
        self.trigger_with(shape, 0)
    }

    /// Queue a trigger carrying `activation`.
    pub fn trigger_with(&self, shape: EnvelopeShape, activation: u64) -> bool {
        self.send(EnvelopeMessage::Trigger { shape, activation })
    }

    /// Queue a release.
    pub fn release(&self) -> bool {
        self.send(EnvelopeMessage::Release)
    }

    /// Queue an immediate stop.
    pub fn stop(&self) -> bool {
        self.send(EnvelopeMessage::Stop)
    }

    /// Queue `message`. Returns `false` if the queue is full or the node is
    /// gone.
    pub fn send(&self, message: EnvelopeMessage) -> bool {
        match self.messages.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                tracing::warn!("envelope queue full, dropping {message:?}");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Level at the end of the last processed block.
    pub fn level(&self) -> f32 {
        f32::from_bits(self.shared.level.load(Ordering::Acquire))
    }

    /// Stage at the end of the last processed block.
    pub fn stage(&self) -> EnvelopeStage {
        EnvelopeStage::from_u8(self.shared.stage.load(Ordering::Acquire))
    }

    /// Completion notifications lost because the receiving queue was full.
    pub fn dropped_notifications(&self) -> u32 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Linear ADSR generator node: no inputs, one output.
pub struct EnvelopeNode {
    messages: Receiver<EnvelopeMessage>,
    notifier: Option<CompletionNotifier>,
    shared: Arc<EnvelopeShared>,
    shape: EnvelopeShape,
    stage: EnvelopeStage,
    level: f32,
    step: f32,
    remaining: u32,
    activation: u64,
    sample_rate: f32,
}

impl EnvelopeNode {
    /// Envelope without completion notification.
    pub fn new() -> (Self, EnvelopeControl) {
        Self::build(None)
    }

    /// Envelope that reports completion through `notifier`.
    pub fn with_notifier(notifier: CompletionNotifier) -> (Self, EnvelopeControl) {
        Self::build(Some(notifier))
    }

    fn build(notifier: Option<CompletionNotifier>) -> (Self, EnvelopeControl) {
        let (tx, rx) = crossbeam_channel::bounded(ENVELOPE_QUEUE_DEPTH);
        let shared = Arc::new(EnvelopeShared::default());
        let node = Self {
            messages: rx,
            notifier,
            shared: Arc::clone(&shared),
            shape: EnvelopeShape::default(),
            stage: EnvelopeStage::Idle,
            level: 0.0,
            step: 0.0,
            remaining: 0,
            activation: 0,
            sample_rate: 48000.0,
        };
        (node, EnvelopeControl { messages: tx, shared })
    }

    fn handle(&mut self, message: EnvelopeMessage) {
        match message {
            EnvelopeMessage::Trigger { shape, activation } => {
                self.shape = shape;
                self.activation = activation;
                self.enter_attack();
            }
            EnvelopeMessage::Release => {
                if matches!(
                    self.stage,
                    EnvelopeStage::Attack | EnvelopeStage::Decay | EnvelopeStage::Sustain
                ) {
                    self.enter_release();
                }
            }
            EnvelopeMessage::Stop => {
                self.stage = EnvelopeStage::Idle;
                self.level = 0.0;
                self.remaining = 0;
            }
        }
    }

    /// Start a segment of `samples` samples ending at `target`. Returns
    /// `false` when the segment is empty and `target` was applied at once.
    fn ramp_to(&mut self, target: f32, ms: f32) -> bool {
        let samples = ms_to_samples(ms, self.sample_rate);
        if samples == 0 {
            self.level = target;
            self.remaining = 0;
            return false;
        }
        self.step = (target - self.level) / samples as f32;
        self.remaining = samples;
        true
    }

    fn enter_attack(&mut self) {
        self.stage = EnvelopeStage::Attack;
        if !self.ramp_to(1.0, self.shape.attack_ms) {
            self.enter_decay();
        }
    }

    fn enter_decay(&mut self) {
        self.stage = EnvelopeStage::Decay;
        let sustain = self.shape.sustain.clamp(0.0, 1.0);
        if !self.ramp_to(sustain, self.shape.decay_ms) {
            self.enter_sustain();
        }
    }

    fn enter_sustain(&mut self) {
        self.stage = EnvelopeStage::Sustain;
        if let Some(hold_ms) = self.shape.hold_ms {
            // A flat ramp: the level stays put while `remaining` counts down.
            if !self.ramp_to(self.level, hold_ms) {
                self.end_hold();
            }
        }
    }

    fn end_hold(&mut self) {
        self.notify(EnvelopeStage::Sustain);
        self.enter_release();
    }

    fn enter_release(&mut self) {
        self.stage = EnvelopeStage::Release;
        if !self.ramp_to(0.0, self.shape.release_ms) {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
        self.notify(EnvelopeStage::Release);
    }

    fn notify(&mut self, segment: EnvelopeStage) {
        if let Some(notifier) = &self.notifier {
            let completion = EnvelopeCompletion {
                id: notifier.id,
                activation: self.activation,
                segment,
            };
            if notifier.sender.try_send(completion).is_err() {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    fn tick(&mut self) -> f32 {
        if self.remaining > 0 {
            self.level += self.step;
            self.remaining -= 1;
            if self.remaining == 0 {
                match self.stage {
                    EnvelopeStage::Attack => {
                        self.level = 1.0;
                        self.enter_decay();
                    }
                    EnvelopeStage::Decay => {
                        self.level = self.shape.sustain.clamp(0.0, 1.0);
                        self.enter_sustain();
                    }
                    EnvelopeStage::Sustain => self.end_hold(),
                    EnvelopeStage::Release => self.finish(),
                    EnvelopeStage::Idle => {}
                }
            }
        }
        self.level
    }
}

impl Node for EnvelopeNode {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn output_count(&self) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        for _ in 0..ENVELOPE_QUEUE_DEPTH {
            match self.messages.try_recv() {
                Ok(message) => self.handle(message),
                Err(_) => break,
            }
        }

        let output = ctx.output(0);
        for sample in output.iter_mut() {
            *sample = self.tick();
        }

        self.shared
            .level
            .store(self.level.to_bits(), Ordering::Release);
        self.shared.stage.store(self.stage as u8, Ordering::Release);
    }

    fn sample_rate_changed(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }
}
