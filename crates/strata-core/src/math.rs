//! Small math helpers shared by node implementations.
//!
//! - [`db_to_linear`] / [`linear_to_db`] - level conversions
//! - [`midi_to_hz`] - equal-tempered pitch, A4 = 440 Hz
//! - [`flush_denormal`] - zero out subnormal feedback state

use libm::{expf, logf, powf};

/// Convert decibels to linear gain.
///
/// ```rust
/// use strata_core::db_to_linear;
///
/// assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
/// assert!((db_to_linear(-6.02) - 0.5).abs() < 0.01);
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    // 10^(dB/20) = e^(dB * ln(10)/20)
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    expf(db * FACTOR)
}

/// Convert linear gain to decibels. Inputs at or below `1e-10` clamp to -200 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    logf(linear.max(1e-10)) * FACTOR
}

/// Frequency of MIDI note `note`.
///
/// ```rust
/// use strata_core::midi_to_hz;
///
/// assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-3);
/// assert!((midi_to_hz(57.0) - 220.0).abs() < 1e-3);
/// ```
#[inline]
pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * powf(2.0, (note - 69.0) / 12.0)
}

/// Flush values too small to matter to zero.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}
