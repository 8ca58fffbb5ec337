//! Wavetable oscillator.
//!
//! [`OscillatorNode`] reads a shared [`WaveTable`] at a ramped frequency with
//! a smoothed amplitude. Its single input is a frequency-modulation signal:
//! the instantaneous frequency is `frequency × (1 + fm)`, so an FM input of
//! `-1` stops the phase and `+1` doubles the pitch.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use strata_core::{
    AudioObject, AudioObjectInstance, LinearSmoothedValue, MultiChannelObject,
    MultiChannelObjectInstance, Node, NodeManager, ObjectError, ObjectInputs, ProcessContext,
    RampMode, RampedValue, RampedValueHandle, SafeOwner, SmoothedValueHandle,
};

use crate::per_channel;
use crate::wavetable::{Waveform, WaveTable};

/// Control surface of an [`OscillatorNode`].
#[derive(Debug, Clone)]
pub struct OscillatorControl {
    frequency: RampedValueHandle,
    amplitude: SmoothedValueHandle,
    phase_offset: Arc<AtomicU32>,
}

impl OscillatorControl {
    /// Glide to `frequency` Hz over `ramp_ms` milliseconds (exponential).
    pub fn set_frequency(&self, frequency: f32, ramp_ms: f32) {
        self.frequency.set_value(frequency, ramp_ms);
    }

    /// Ramp the amplitude over `ramp_samples` samples.
    pub fn set_amplitude(&self, amplitude: f32, ramp_samples: u32) {
        self.amplitude.set_value(amplitude, ramp_samples);
    }

    /// Phase offset as a fraction of a cycle, wrapped into `0.0..1.0`.
    pub fn set_phase(&self, offset: f32) {
        let offset = offset - libm::floorf(offset);
        self.phase_offset.store(offset.to_bits(), Ordering::Relaxed);
    }

    /// Most recently requested frequency.
    pub fn frequency(&self) -> f32 {
        self.frequency.target()
    }
}

/// Oscillator reading a shared wavetable.
pub struct OscillatorNode {
    wave: Arc<WaveTable>,
    frequency: RampedValue,
    amplitude: LinearSmoothedValue,
    phase_offset: Arc<AtomicU32>,
    /// Position in table samples.
    phase: f64,
    /// Table samples per hertz per sample: `size / sample_rate`.
    step: f64,
}

impl OscillatorNode {
    /// Oscillator at `frequency` Hz with unit amplitude.
    pub fn new(wave: Arc<WaveTable>, frequency: f32) -> (Self, OscillatorControl) {
        let frequency = RampedValue::new(frequency, RampMode::Exponential);
        let amplitude = LinearSmoothedValue::new(1.0);
        let phase_offset = Arc::new(AtomicU32::new(0.0f32.to_bits()));
        let control = OscillatorControl {
            frequency: frequency.handle(),
            amplitude: amplitude.handle(),
            phase_offset: Arc::clone(&phase_offset),
        };
        let step = wave.size() as f64 / 48000.0;
        let node = Self {
            wave,
            frequency,
            amplitude,
            phase_offset,
            phase: 0.0,
            step,
        };
        (node, control)
    }
}

impl Node for OscillatorNode {
    fn name(&self) -> &'static str {
        "oscillator"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_count(&self) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let fm = ctx.input(0);
        let size = self.wave.size() as f64;
        let offset = f64::from(f32::from_bits(self.phase_offset.load(Ordering::Relaxed))) * size;

        for (out, modulation) in ctx.output(0).iter_mut().zip(fm) {
            let frequency = self.frequency.next_value();
            let amplitude = self.amplitude.next_value();
            *out = amplitude * self.wave.interpolate(self.phase + offset, frequency);

            let increment = f64::from(frequency * (1.0 + modulation)) * self.step;
            self.phase = (self.phase + increment).rem_euclid(size);
        }
    }

    fn sample_rate_changed(&mut self, sample_rate: f32) {
        self.step = self.wave.size() as f64 / f64::from(sample_rate);
        self.frequency.set_sample_rate(sample_rate);
    }
}

/// Multichannel oscillator sharing one wavetable across channels.
///
/// `frequencies`, `amplitudes` and `phases` repeat when shorter than the
/// channel count. The optional first input object drives FM per channel.
#[derive(Debug, Clone)]
pub struct Oscillator {
    /// Number of channels.
    pub channel_count: usize,
    /// Frequency per channel in Hz.
    pub frequencies: Vec<f32>,
    /// Amplitude per channel.
    pub amplitudes: Vec<f32>,
    /// Phase offset per channel, in cycles.
    pub phases: Vec<f32>,
    /// Shared waveform data.
    pub wave: Arc<WaveTable>,
}

impl Oscillator {
    /// Sine oscillator with one channel at 440 Hz.
    pub fn new(waveform: Waveform) -> Self {
        Self {
            channel_count: 1,
            frequencies: vec![440.0],
            amplitudes: vec![1.0],
            phases: vec![0.0],
            wave: Arc::new(WaveTable::new(2048, waveform, 8)),
        }
    }
}

impl MultiChannelObject for Oscillator {
    type Control = OscillatorControl;

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn create_node(
        &self,
        channel: usize,
        manager: &NodeManager,
        inputs: &ObjectInputs,
    ) -> Result<SafeOwner<OscillatorControl>, ObjectError> {
        let frequency = per_channel(&self.frequencies, channel, 440.0);
        let (node, control) = OscillatorNode::new(Arc::clone(&self.wave), frequency);
        control.set_amplitude(per_channel(&self.amplitudes, channel, 1.0), 0);
        control.set_phase(per_channel(&self.phases, channel, 0.0));
        let node = manager.register_with(node, control)?;
        if let Some(fm) = inputs.output_for(0, channel) {
            manager.connect(fm, node.input(0))?;
        }
        Ok(node)
    }
}

impl AudioObject for Oscillator {
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

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::EngineConfig;

    fn sine() -> Arc<WaveTable> {
        Arc::new(WaveTable::new(1000, Waveform::Sine, 1))
    }

    #[test]
    fn quarter_rate_sine_cycles_every_four_samples() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 8, 1));
        let (node, control) = OscillatorNode::new(sine(), 250.0);
        let osc = manager.register_with(node, control).unwrap();
        manager.route(0, osc.output(0)).unwrap();

        let mut out = [0.0f32; 8];
        processor.process(&mut out);
        let expected = [0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0];
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-4, "{out:?}");
        }
    }

    #[test]
    fn phase_offset_shifts_the_cycle() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let (node, control) = OscillatorNode::new(sine(), 250.0);
        let osc = manager.register_with(node, control).unwrap();
        manager.route(0, osc.output(0)).unwrap();
        osc.set_phase(1.25);

        let mut out = [0.0f32; 4];
        processor.process(&mut out);
        assert!((out[0] - 1.0).abs() < 1e-4);
        assert!((out[1]).abs() < 1e-4);
    }

    #[test]
    fn negative_unit_fm_freezes_the_phase() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let (dc, handle) = crate::ConstantNode::new(-1.0);
        let dc = manager.register_with(dc, handle).unwrap();
        let (node, control) = OscillatorNode::new(sine(), 250.0);
        let osc = manager.register_with(node, control).unwrap();
        manager.connect(dc.output(0), osc.input(0)).unwrap();
        manager.route(0, osc.output(0)).unwrap();
        osc.set_phase(0.25);

        let mut out = [0.0f32; 4];
        processor.process(&mut out);
        for sample in out {
            assert!((sample - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn amplitude_table_repeats_per_channel() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 2));
        let object = Oscillator {
            channel_count: 2,
            frequencies: vec![250.0],
            amplitudes: vec![1.0, 0.5],
            phases: vec![0.25],
            wave: sine(),
        };
        let instance = object.instantiate("osc", &manager, &[]).unwrap();
        for channel in 0..2 {
            manager
                .route(channel, instance.output_for_channel(channel).unwrap())
                .unwrap();
        }
        let mut out = [0.0f32; 8];
        processor.process(&mut out);
        assert!((out[0] - 1.0).abs() < 1e-4);
        assert!((out[1] - 0.5).abs() < 1e-4);
    }
}
