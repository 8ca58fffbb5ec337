//! Click-free parameter smoothing shared between the control and audio threads.
//!
//! Any parameter that is audible when stepped (gain, frequency, amplitude,
//! cutoff) is exposed only through one of these primitives. The audio-side
//! value lives inside the node and is advanced once per sample; the control
//! thread holds a cloneable handle that publishes new targets atomically.
//!
//! ## Primitives
//!
//! - [`LinearSmoothedValue`] ramps linearly over a ramp length given in samples.
//! - [`RampedValue`] takes the ramp length in milliseconds, converts it with the
//!   current sample rate, and optionally ramps exponentially ([`RampMode`]).
//!
//! ## Cross-thread protocol
//!
//! The handle writes `(target, ramp)` into one packed `AtomicU64` and then bumps
//! a version counter. The audio side compares the version once per sample and,
//! when it changed, restarts its ramp from the current value. No locks, no
//! allocation, and a target/ramp pair is never torn.
//!
//! ## Usage
//!
//! ```rust
//! use strata_core::LinearSmoothedValue;
//!
//! let mut gain = LinearSmoothedValue::new(1.0);
//! let handle = gain.handle();
//!
//! // Control thread
//! handle.set_value(0.5, 4);
//!
//! // Audio thread
//! let ramp: Vec<f32> = (0..4).map(|_| gain.next_value()).collect();
//! assert_eq!(ramp, vec![0.875, 0.75, 0.625, 0.5]);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use libm::powf;

/// Target cell written by the control thread and polled by the audio thread.
#[derive(Debug)]
struct SharedTarget {
    /// `target.to_bits() << 32 | ramp_bits`
    packed: AtomicU64,
    version: AtomicU32,
}

impl SharedTarget {
    fn new(value: f32) -> Arc<Self> {
        Arc::new(Self {
            packed: AtomicU64::new(pack(value, 0)),
            version: AtomicU32::new(0),
        })
    }

    fn publish(&self, value: f32, ramp_bits: u32) {
        self.packed.store(pack(value, ramp_bits), Ordering::Release);
        self.version.fetch_add(1, Ordering::Release);
    }

    fn target(&self) -> f32 {
        unpack(self.packed.load(Ordering::Acquire)).0
    }

    /// Returns the published pair when the version moved past `seen`.
    #[inline]
    fn poll(&self, seen: &mut u32) -> Option<(f32, u32)> {
        let version = self.version.load(Ordering::Acquire);
        if version == *seen {
            return None;
        }
        *seen = version;
        Some(unpack(self.packed.load(Ordering::Acquire)))
    }
}

#[inline]
fn pack(value: f32, ramp_bits: u32) -> u64 {
    (u64::from(value.to_bits()) << 32) | u64::from(ramp_bits)
}

#[inline]
fn unpack(bits: u64) -> (f32, u32) {
    (f32::from_bits((bits >> 32) as u32), bits as u32)
}

/// Interpolation curve used by [`RampedValue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RampMode {
    /// Constant rate of change.
    #[default]
    Linear,
    /// Constant ratio per sample; suited to frequencies. Falls back to linear
    /// when either endpoint is not strictly positive.
    Exponential,
}

/// Audio-side ramp state.
#[derive(Debug, Clone, Copy)]
struct Ramp {
    current: f32,
    start: f32,
    target: f32,
    total: u32,
    elapsed: u32,
    exponential: bool,
}

impl Ramp {
    fn new(value: f32) -> Self {
        Self {
            current: value,
            start: value,
            target: value,
            total: 0,
            elapsed: 0,
            exponential: false,
        }
    }

    fn start(&mut self, target: f32, samples: u32, mode: RampMode) {
        self.start = self.current;
        self.target = target;
        self.elapsed = 0;
        if samples == 0 {
            self.current = target;
            self.total = 0;
            return;
        }
        self.total = samples;
        self.exponential =
            mode == RampMode::Exponential && self.start > 0.0 && target > 0.0;
    }

    #[inline]
    fn advance(&mut self) -> f32 {
        if self.elapsed < self.total {
            self.elapsed += 1;
            self.current = if self.elapsed == self.total {
                self.target
            } else {
                self.interpolate()
            };
        }
        self.current
    }

    fn interpolate(&self) -> f32 {
        let t = self.elapsed as f32 / self.total as f32;
        let value = if self.exponential {
            self.start * powf(self.target / self.start, t)
        } else {
            self.start + (self.target - self.start) * t
        };
        // Rounding must never carry an intermediate sample past either endpoint.
        let (lo, hi) = if self.start <= self.target {
            (self.start, self.target)
        } else {
            (self.target, self.start)
        };
        value.max(lo).min(hi)
    }

    fn snap(&mut self, value: f32) {
        *self = Self::new(value);
    }

    fn is_ramping(&self) -> bool {
        self.elapsed < self.total
    }

    fn remaining(&self) -> u32 {
        self.total - self.elapsed
    }
}

/// Linear ramp toward a target over a fixed number of samples.
///
/// After exactly `R` calls to [`next_value`](Self::next_value) following
/// `set_value(target, R)` the value equals `target` bit for bit, and every
/// intermediate sample lies between the start value and the target.
/// A ramp length of zero is a one-sample jump.
#[derive(Debug)]
pub struct LinearSmoothedValue {
    ramp: Ramp,
    shared: Arc<SharedTarget>,
    seen: u32,
}

impl LinearSmoothedValue {
    /// Create a settled value.
    pub fn new(initial: f32) -> Self {
        Self {
            ramp: Ramp::new(initial),
            shared: SharedTarget::new(initial),
            seen: 0,
        }
    }

    /// Control-thread handle publishing new targets to this value.
    pub fn handle(&self) -> SmoothedValueHandle {
        SmoothedValueHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start a ramp from the current value (audio side).
    pub fn set_value(&mut self, target: f32, ramp_samples: u32) {
        self.ramp.start(target, ramp_samples, RampMode::Linear);
    }

    /// Jump to `value` and stop any ramp in progress (audio side).
    pub fn set_immediate(&mut self, value: f32) {
        self.ramp.snap(value);
    }

    /// Advance one sample and return the interpolated value.
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if let Some((target, samples)) = self.shared.poll(&mut self.seen) {
            self.ramp.start(target, samples, RampMode::Linear);
        }
        self.ramp.advance()
    }

    /// Current value without advancing.
    #[inline]
    pub fn value(&self) -> f32 {
        self.ramp.current
    }

    /// Value the ramp is heading to.
    pub fn target(&self) -> f32 {
        self.ramp.target
    }

    /// Whether a ramp is in progress.
    pub fn is_ramping(&self) -> bool {
        self.ramp.is_ramping()
    }

    /// Samples left in the current ramp.
    pub fn remaining(&self) -> u32 {
        self.ramp.remaining()
    }
}

impl Default for LinearSmoothedValue {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Control-thread handle of a [`LinearSmoothedValue`].
#[derive(Debug, Clone)]
pub struct SmoothedValueHandle {
    shared: Arc<SharedTarget>,
}

impl SmoothedValueHandle {
    /// Ramp to `target` over `ramp_samples` samples.
    pub fn set_value(&self, target: f32, ramp_samples: u32) {
        self.shared.publish(target, ramp_samples);
    }

    /// Jump to `value` on the next sample.
    pub fn set_immediate(&self, value: f32) {
        self.set_value(value, 0);
    }

    /// Most recently published target.
    pub fn target(&self) -> f32 {
        self.shared.target()
    }
}

/// Ramp toward a target over a duration in milliseconds.
///
/// The duration is converted to samples with the sample rate last passed to
/// [`set_sample_rate`](Self::set_sample_rate); a duration that rounds to zero
/// samples is a one-sample jump.
#[derive(Debug)]
pub struct RampedValue {
    ramp: Ramp,
    mode: RampMode,
    sample_rate: f32,
    shared: Arc<SharedTarget>,
    seen: u32,
}

impl RampedValue {
    /// Create a settled value. The sample rate defaults to 48 kHz until the
    /// owning node is told otherwise.
    pub fn new(initial: f32, mode: RampMode) -> Self {
        Self {
            ramp: Ramp::new(initial),
            mode,
            sample_rate: 48000.0,
            shared: SharedTarget::new(initial),
            seen: 0,
        }
    }

    /// Control-thread handle publishing new targets to this value.
    pub fn handle(&self) -> RampedValueHandle {
        RampedValueHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Update the rate used for millisecond conversion. A ramp already in
    /// progress keeps its sample length.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Start a ramp from the current value (audio side).
    pub fn set_value(&mut self, target: f32, ramp_ms: f32) {
        let samples = ms_to_samples(ramp_ms, self.sample_rate);
        self.ramp.start(target, samples, self.mode);
    }

    /// Jump to `value` and stop any ramp in progress (audio side).
    pub fn set_immediate(&mut self, value: f32) {
        self.ramp.snap(value);
    }

    /// Advance one sample and return the interpolated value.
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if let Some((target, ms_bits)) = self.shared.poll(&mut self.seen) {
            self.set_value(target, f32::from_bits(ms_bits));
        }
        self.ramp.advance()
    }

    /// Current value without advancing.
    #[inline]
    pub fn value(&self) -> f32 {
        self.ramp.current
    }

    /// Value the ramp is heading to.
    pub fn target(&self) -> f32 {
        self.ramp.target
    }

    /// Whether a ramp is in progress.
    pub fn is_ramping(&self) -> bool {
        self.ramp.is_ramping()
    }

    /// Interpolation curve.
    pub fn mode(&self) -> RampMode {
        self.mode
    }
}

/// Control-thread handle of a [`RampedValue`].
#[derive(Debug, Clone)]
pub struct RampedValueHandle {
    shared: Arc<SharedTarget>,
}

impl RampedValueHandle {
    /// Ramp to `target` over `ramp_ms` milliseconds.
    pub fn set_value(&self, target: f32, ramp_ms: f32) {
        self.shared.publish(target, ramp_ms.to_bits());
    }

    /// Jump to `value` on the next sample.
    pub fn set_immediate(&self, value: f32) {
        self.set_value(value, 0.0);
    }

    /// Most recently published target.
    pub fn target(&self) -> f32 {
        self.shared.target()
    }
}

/// Convert a duration to a whole number of samples. Negative and NaN
/// durations give zero.
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f32) -> u32 {
    let samples = (ms * 0.001 * sample_rate).round();
    if samples > 0.0 { samples as u32 } else { 0 }
}
