//! Resonant filter node and multichannel filter object.
//!
//! # Topology
//!
//! Topology-Preserving Transform (TPT) state variable filter after Zavalishin,
//! "The Art of VA Filter Design". The trapezoidal integrators keep the filter
//! stable while cutoff is ramped sample by sample, so frequency changes go
//! through a [`RampedValue`] instead of being applied in steps.
//!
//! # Parameters
//!
//! - `frequency`: cutoff or center frequency in Hz, clamped to
//!   `10.0..=0.49 × sample_rate`
//! - `resonance`: added to the Butterworth Q (0.707) for low and high pass
//! - `band`: bandwidth in Hz for band pass and notch (`Q = frequency / band`)
//! - `gain`: output gain

use core::f32::consts::{FRAC_1_SQRT_2, PI};
use libm::tanf;
use strata_core::{
    AudioObject, AudioObjectInstance, LinearSmoothedValue, MultiChannelObject,
    MultiChannelObjectInstance, Node, NodeManager, ObjectError, ObjectInputs, ProcessContext,
    RampMode, RampedValue, RampedValueHandle, SafeOwner, SmoothedValueHandle, flush_denormal,
};

use crate::per_channel;

/// Filter response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterMode {
    /// Passes frequencies below the cutoff.
    #[default]
    LowPass,
    /// Passes frequencies above the cutoff.
    HighPass,
    /// Passes a band around the center frequency.
    BandPass,
    /// Rejects a band around the center frequency.
    Notch,
}

impl FilterMode {
    /// Parse a snake_case mode name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "low_pass" | "lowpass" => Some(Self::LowPass),
            "high_pass" | "highpass" => Some(Self::HighPass),
            "band_pass" | "bandpass" => Some(Self::BandPass),
            "notch" => Some(Self::Notch),
            _ => None,
        }
    }
}

/// Control surface of a [`FilterNode`].
#[derive(Debug, Clone)]
pub struct FilterControl {
    frequency: RampedValueHandle,
    resonance: SmoothedValueHandle,
    band: SmoothedValueHandle,
    gain: SmoothedValueHandle,
}

impl FilterControl {
    /// Sweep the cutoff to `frequency` Hz over `ramp_ms` (exponential).
    pub fn set_frequency(&self, frequency: f32, ramp_ms: f32) {
        self.frequency.set_value(frequency, ramp_ms);
    }

    /// Ramp the resonance over `ramp_samples` samples.
    pub fn set_resonance(&self, resonance: f32, ramp_samples: u32) {
        self.resonance.set_value(resonance, ramp_samples);
    }

    /// Ramp the bandwidth over `ramp_samples` samples.
    pub fn set_band(&self, band: f32, ramp_samples: u32) {
        self.band.set_value(band, ramp_samples);
    }

    /// Ramp the output gain over `ramp_samples` samples.
    pub fn set_gain(&self, gain: f32, ramp_samples: u32) {
        self.gain.set_value(gain, ramp_samples);
    }
}

/// Initial filter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    /// Response type.
    pub mode: FilterMode,
    /// Cutoff or center frequency in Hz.
    pub frequency: f32,
    /// Resonance added to the Butterworth Q.
    pub resonance: f32,
    /// Bandwidth in Hz.
    pub band: f32,
    /// Output gain.
    pub gain: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            mode: FilterMode::LowPass,
            frequency: 440.0,
            resonance: 0.0,
            band: 100.0,
            gain: 1.0,
        }
    }
}

/// Two-pole TPT state variable filter with one input and one output.
pub struct FilterNode {
    mode: FilterMode,
    frequency: RampedValue,
    resonance: LinearSmoothedValue,
    band: LinearSmoothedValue,
    gain: LinearSmoothedValue,
    sample_rate: f32,
    ic1eq: f32,
    ic2eq: f32,
    g: f32,
    k: f32,
    /// Parameters the cached `g`/`k` were computed from.
    cached: (f32, f32, f32),
}

impl FilterNode {
    /// Filter with the given settings.
    pub fn new(settings: FilterSettings) -> (Self, FilterControl) {
        let frequency = RampedValue::new(settings.frequency, RampMode::Exponential);
        let resonance = LinearSmoothedValue::new(settings.resonance);
        let band = LinearSmoothedValue::new(settings.band);
        let gain = LinearSmoothedValue::new(settings.gain);
        let control = FilterControl {
            frequency: frequency.handle(),
            resonance: resonance.handle(),
            band: band.handle(),
            gain: gain.handle(),
        };
        let node = Self {
            mode: settings.mode,
            frequency,
            resonance,
            band,
            gain,
            sample_rate: 48000.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
            g: 0.0,
            k: 0.0,
            cached: (f32::NAN, f32::NAN, f32::NAN),
        };
        (node, control)
    }

    fn update_coefficients(&mut self, frequency: f32, resonance: f32, band: f32) {
        if self.cached == (frequency, resonance, band) {
            return;
        }
        self.cached = (frequency, resonance, band);

        let cutoff = frequency.clamp(10.0, self.sample_rate * 0.49);
        let q = match self.mode {
            FilterMode::LowPass | FilterMode::HighPass => FRAC_1_SQRT_2 + resonance.max(0.0),
            FilterMode::BandPass | FilterMode::Notch => cutoff / band.max(1.0),
        };
        self.g = tanf(PI * cutoff / self.sample_rate);
        self.k = 1.0 / q.max(0.01);
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let v3 = input - self.ic2eq;
        let v1 = (self.g * v3 + self.ic1eq) / (1.0 + self.g * (self.g + self.k));
        let v2 = self.ic2eq + self.g * v1;
        self.ic1eq = flush_denormal(2.0 * v1 - self.ic1eq);
        self.ic2eq = flush_denormal(2.0 * v2 - self.ic2eq);

        let lp = v2;
        let bp = v1;
        let hp = input - self.k * v1 - v2;
        match self.mode {
            FilterMode::LowPass => lp,
            FilterMode::HighPass => hp,
            FilterMode::BandPass => self.k * bp,
            FilterMode::Notch => lp + hp,
        }
    }
}

impl Node for FilterNode {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_count(&self) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let input = ctx.input(0);
        for (out, &sample) in ctx.output(0).iter_mut().zip(input) {
            let frequency = self.frequency.next_value();
            let resonance = self.resonance.next_value();
            let band = self.band.next_value();
            self.update_coefficients(frequency, resonance, band);
            *out = self.tick(sample) * self.gain.next_value();
        }
    }

    fn sample_rate_changed(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.frequency.set_sample_rate(sample_rate);
        self.cached = (f32::NAN, f32::NAN, f32::NAN);
    }
}

/// Multichannel filter over one input object.
///
/// Parameter tables repeat when shorter than the channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Number of channels.
    pub channel_count: usize,
    /// Response type shared by all channels.
    pub mode: FilterMode,
    /// Frequency per channel in Hz.
    pub frequencies: Vec<f32>,
    /// Resonance per channel.
    pub resonances: Vec<f32>,
    /// Bandwidth per channel in Hz.
    pub bands: Vec<f32>,
    /// Output gain per channel.
    pub gains: Vec<f32>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            channel_count: 1,
            mode: FilterMode::LowPass,
            frequencies: vec![440.0],
            resonances: vec![0.0],
            bands: vec![100.0],
            gains: vec![1.0],
        }
    }
}

impl Filter {
    fn settings(&self, channel: usize) -> FilterSettings {
        let defaults = FilterSettings::default();
        FilterSettings {
            mode: self.mode,
            frequency: per_channel(&self.frequencies, channel, defaults.frequency),
            resonance: per_channel(&self.resonances, channel, defaults.resonance),
            band: per_channel(&self.bands, channel, defaults.band),
            gain: per_channel(&self.gains, channel, defaults.gain),
        }
    }
}

impl MultiChannelObject for Filter {
    type Control = FilterControl;

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn create_node(
        &self,
        channel: usize,
        manager: &NodeManager,
        inputs: &ObjectInputs,
    ) -> Result<SafeOwner<FilterControl>, ObjectError> {
        // Resolve the input first so a missing input registers nothing.
        let source = inputs.require("filter", 0, channel)?;
        let (node, control) = FilterNode::new(self.settings(channel));
        let node = manager.register_with(node, control)?;
        manager.connect(source, node.input(0))?;
        Ok(node)
    }
}

impl AudioObject for Filter {
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
    use crate::{Oscillator, Waveform};
    use strata_core::EngineConfig;

    fn rms(signal: &[f32]) -> f32 {
        (signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
    }

    /// RMS of a unit sine at `tone` Hz through the filter, after settling.
    fn response(mode: FilterMode, cutoff: f32, tone: f32) -> f32 {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(48000.0, 512, 1));
        let osc = Oscillator {
            frequencies: vec![tone],
            ..Oscillator::new(Waveform::Sine)
        }
        .instantiate("osc", &manager, &[])
        .unwrap();
        let filter = Filter {
            mode,
            frequencies: vec![cutoff],
            ..Filter::default()
        }
        .instantiate("filter", &manager, &[osc.as_ref()])
        .unwrap();
        manager
            .route(0, filter.output_for_channel(0).unwrap())
            .unwrap();

        let mut out = vec![0.0f32; 9600];
        processor.process(&mut out);
        rms(&out[4800..])
    }

    #[test]
    fn low_pass_attenuates_above_cutoff() {
        let pass = response(FilterMode::LowPass, 1000.0, 100.0);
        let stop = response(FilterMode::LowPass, 1000.0, 10_000.0);
        assert!((pass - FRAC_1_SQRT_2).abs() < 0.05, "passband rms {pass}");
        assert!(stop < 0.05, "stopband rms {stop}");
    }

    #[test]
    fn high_pass_attenuates_below_cutoff() {
        let pass = response(FilterMode::HighPass, 1000.0, 10_000.0);
        let stop = response(FilterMode::HighPass, 1000.0, 100.0);
        assert!(pass > 0.6, "passband rms {pass}");
        assert!(stop < 0.05, "stopband rms {stop}");
    }

    #[test]
    fn band_pass_is_unity_at_center() {
        let center = response(FilterMode::BandPass, 1000.0, 1000.0);
        let off = response(FilterMode::BandPass, 1000.0, 8000.0);
        assert!((center - FRAC_1_SQRT_2).abs() < 0.05, "center rms {center}");
        assert!(off < 0.1, "off-band rms {off}");
    }

    #[test]
    fn filter_without_input_is_rejected() {
        let (manager, _processor) = NodeManager::new(EngineConfig::default());
        let result = Filter::default().instantiate("lonely", &manager, &[]);
        assert!(matches!(result, Err(ObjectError::MissingInput { index: 0, .. })));
        assert_eq!(manager.live_node_count(), 0);
    }
}
