//! Strata Nodes - node library for the strata audio graph
//!
//! Concrete [`Node`](strata_core::Node) implementations and the multichannel
//! objects wrapping them.
//!
//! # Core Components
//!
//! ## Sources
//!
//! - [`ConstantNode`] / [`Constant`] - Smoothed DC values
//! - [`OscillatorNode`] / [`Oscillator`] - Band-limited wavetable oscillator with FM input
//! - [`BufferPlayerNode`] / [`BufferPlayer`] - Variable-speed playback of an [`AudioBuffer`]
//! - [`BufferLooperInstance`] / [`BufferLooper`] - Crossfaded looping of a buffer region
//!
//! ## Processors
//!
//! - [`GainNode`] / [`Gain`] - Product of inputs and a smoothed gain
//! - [`FilterNode`] / [`Filter`] - State-variable filter (low/high/band pass, notch)
//!
//! ## Sinks
//!
//! - [`CaptureNode`] / [`Capture`] - Copies a signal to the control thread
//!
//! Every object takes per-channel parameter tables that repeat when shorter
//! than the channel count, so `frequencies: vec![220.0, 330.0]` on a four
//! channel oscillator yields 220, 330, 220, 330.
//!
//! # Example
//!
//! ```rust
//! use strata_core::{AudioObject, AudioObjectInstance, EngineConfig, NodeManager};
//! use strata_nodes::{Gain, Oscillator, Waveform};
//!
//! let (manager, mut processor) = NodeManager::new(EngineConfig::new(48_000.0, 128, 2));
//!
//! let mut osc = Oscillator::new(Waveform::Saw);
//! osc.channel_count = 2;
//! osc.frequencies = vec![220.0, 221.0];
//! let osc = osc.instantiate("osc", &manager, &[]).unwrap();
//!
//! let gain = Gain { channel_count: 2, gains: vec![0.25] };
//! let gain = gain.instantiate("gain", &manager, &[osc.as_ref()]).unwrap();
//! for channel in 0..2 {
//!     manager.route(channel, gain.output_for_channel(channel).unwrap()).unwrap();
//! }
//!
//! let mut buffer = vec![0.0f32; 128 * 2];
//! processor.process(&mut buffer);
//! assert!(buffer.iter().all(|s| s.abs() <= 0.25 + 1e-6));
//! ```

pub mod buffer_player;
pub mod capture;
pub mod constant;
pub mod filter;
pub mod gain;
pub mod looper;
pub mod oscillator;
pub mod wavetable;

// Re-export main types at crate root
pub use buffer_player::{AudioBuffer, BufferPlayer, BufferPlayerControl, BufferPlayerNode};
pub use capture::{
    Capture, CaptureInstance, CaptureNode, CaptureReceiver, DEFAULT_CAPTURE_BLOCKS,
};
pub use constant::{Constant, ConstantNode};
pub use filter::{Filter, FilterControl, FilterMode, FilterNode, FilterSettings};
pub use gain::{Gain, GainNode};
pub use looper::{BufferLooper, BufferLooperInstance, LooperVoice};
pub use oscillator::{Oscillator, OscillatorControl, OscillatorNode};
pub use wavetable::{NYQUIST, WaveTable, Waveform};

/// Entry `channel` of a per-channel table, repeating the table when it is
/// shorter than the channel count. Empty tables yield `default`.
#[inline]
pub(crate) fn per_channel(values: &[f32], channel: usize, default: f32) -> f32 {
    if values.is_empty() {
        default
    } else {
        values[channel % values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::per_channel;

    #[test]
    fn tables_repeat() {
        assert_eq!(per_channel(&[1.0, 2.0], 3, 0.0), 2.0);
        assert_eq!(per_channel(&[], 3, 7.0), 7.0);
    }
}
