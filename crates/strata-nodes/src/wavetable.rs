//! Band-limited wavetables.
//!
//! A [`WaveTable`] holds one cycle of a periodic waveform. With more than one
//! band, each band is built additively with only the harmonics that stay
//! below Nyquist for the highest fundamental the band serves, and lookups
//! pick the band from the playback frequency.
//!
//! # Band layout
//!
//! Bands are spaced an octave apart downwards from [`NYQUIST`]: band
//! `bands - 1` serves fundamentals up to Nyquist (fundamental only), band
//! `bands - 2` up to Nyquist / 2 (two harmonics), and so on. Band 0 serves
//! everything below its upper edge.
//!
//! A single-band table is the naive waveform, unfiltered.

use core::f32::consts::{PI, TAU};
use libm::sinf;

/// Upper frequency assumed when building band-limited tables.
pub const NYQUIST: f32 = 22500.0;

/// Periodic waveform shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Waveform {
    /// Pure fundamental.
    #[default]
    Sine,
    /// Rising sawtooth; all harmonics.
    Saw,
    /// 50% square; odd harmonics.
    Square,
    /// Triangle; odd harmonics falling with the square of their number.
    Triangle,
}

impl Waveform {
    /// Parse a lowercase waveform name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sine" => Some(Self::Sine),
            "saw" => Some(Self::Saw),
            "square" => Some(Self::Square),
            "triangle" => Some(Self::Triangle),
            _ => None,
        }
    }

    /// Value at `phase` in `0.0..1.0`, without band limiting.
    fn naive(self, phase: f32) -> f32 {
        match self {
            Self::Sine => sinf(TAU * phase),
            Self::Saw => {
                // Starts at zero to line up with the additive version.
                let shifted = phase + 0.5;
                2.0 * (shifted - libm::floorf(shifted)) - 1.0
            }
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
        }
    }

    /// Amplitude of harmonic `k` (1-based) in the Fourier sine series.
    fn harmonic(self, k: usize) -> f32 {
        let kf = k as f32;
        match self {
            Self::Sine => {
                if k == 1 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Saw => {
                let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
                sign * 2.0 / (PI * kf)
            }
            Self::Square => {
                if k % 2 == 1 {
                    4.0 / (PI * kf)
                } else {
                    0.0
                }
            }
            Self::Triangle => {
                if k % 2 == 1 {
                    let sign = if (k / 2) % 2 == 0 { 1.0 } else { -1.0 };
                    sign * 8.0 / (PI * PI * kf * kf)
                } else {
                    0.0
                }
            }
        }
    }
}

/// One or more single-cycle tables of the same waveform.
#[derive(Debug, Clone)]
pub struct WaveTable {
    waveform: Waveform,
    bands: Vec<Vec<f32>>,
    /// Upper fundamental frequency served by each band, ascending.
    edges: Vec<f32>,
}

impl WaveTable {
    /// Build a table of `size` samples with `bands` band-limited versions.
    /// `size` is raised to at least 4 and `bands` to at least 1.
    pub fn new(size: usize, waveform: Waveform, bands: usize) -> Self {
        let size = size.max(4);
        let bands = bands.max(1);

        let (bands, edges) = if bands == 1 {
            let table = (0..size)
                .map(|i| waveform.naive(i as f32 / size as f32))
                .collect();
            (vec![table], vec![f32::INFINITY])
        } else {
            let mut tables = Vec::with_capacity(bands);
            let mut edges = Vec::with_capacity(bands);
            for band in 0..bands {
                let edge = NYQUIST / (1u32 << (bands - 1 - band).min(31)) as f32;
                let harmonics = ((NYQUIST / edge) as usize).clamp(1, size / 2);
                tables.push(additive(waveform, size, harmonics));
                edges.push(edge);
            }
            (tables, edges)
        };

        let mut table = Self {
            waveform,
            bands,
            edges,
        };
        table.normalize();
        table
    }

    /// Scale every band so its loudest sample has magnitude 1.
    pub fn normalize(&mut self) {
        for band in &mut self.bands {
            let peak = band.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
            if peak > 0.0 {
                for sample in band.iter_mut() {
                    *sample /= peak;
                }
            }
        }
    }

    /// Samples per cycle.
    pub fn size(&self) -> usize {
        self.bands[0].len()
    }

    /// Number of bands.
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Waveform the table was built from.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Band used for a fundamental of `frequency` Hz.
    pub fn band_for(&self, frequency: f32) -> usize {
        let frequency = frequency.abs();
        self.edges
            .iter()
            .position(|&edge| frequency <= edge)
            .unwrap_or(self.bands.len() - 1)
    }

    /// Linearly interpolated read at fractional `index`, which wraps around
    /// the table.
    #[inline]
    pub fn interpolate(&self, index: f64, frequency: f32) -> f32 {
        let band = &self.bands[self.band_for(frequency)];
        let size = band.len();
        let wrapped = index.rem_euclid(size as f64);
        let floor = wrapped as usize;
        let frac = (wrapped - floor as f64) as f32;
        let a = band[floor % size];
        let b = band[(floor + 1) % size];
        a + (b - a) * frac
    }
}

fn additive(waveform: Waveform, size: usize, harmonics: usize) -> Vec<f32> {
    let mut table = vec![0.0f32; size];
    for k in 1..=harmonics {
        let amplitude = waveform.harmonic(k);
        if amplitude == 0.0 {
            continue;
        }
        for (i, sample) in table.iter_mut().enumerate() {
            let phase = (i * k % size) as f32 / size as f32;
            *sample += amplitude * sinf(TAU * phase);
        }
    }
    table
}
