//! Object types a patch can name, their parameters, and conversion into
//! engine objects.

use std::path::PathBuf;

use strata_core::{AudioObject, MAX_CHANNELS};
use strata_nodes::{BufferPlayer, Constant, Filter, FilterMode, Gain, Oscillator, Waveform};

use crate::patch::{ObjectConfig, ParamValue, Patch};
use crate::validation::{ValidationError, ValidationResult};
use crate::ConfigError;

/// Object types known to the patch format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Constant value per channel.
    Constant,
    /// Multiplies its inputs.
    Gain,
    /// Wavetable oscillator with optional FM input.
    Oscillator,
    /// Resonant filter over one input.
    Filter,
    /// Plays a WAV file.
    BufferPlayer,
}

impl ObjectKind {
    /// All known kinds.
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Constant,
        ObjectKind::Gain,
        ObjectKind::Oscillator,
        ObjectKind::Filter,
        ObjectKind::BufferPlayer,
    ];

    /// Parse a type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Type name as written in patches.
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Constant => "constant",
            ObjectKind::Gain => "gain",
            ObjectKind::Oscillator => "oscillator",
            ObjectKind::Filter => "filter",
            ObjectKind::BufferPlayer => "buffer_player",
        }
    }

    /// Parameter names accepted by this kind.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            ObjectKind::Constant => &["value"],
            ObjectKind::Gain => &["gain"],
            ObjectKind::Oscillator => &["waveform", "frequency", "amplitude", "phase"],
            ObjectKind::Filter => &["mode", "frequency", "resonance", "band", "gain"],
            ObjectKind::BufferPlayer => &["file", "speed", "auto_play"],
        }
    }

    /// Smallest and largest number of input objects.
    pub fn input_range(self) -> (usize, usize) {
        match self {
            ObjectKind::Constant | ObjectKind::BufferPlayer => (0, 0),
            ObjectKind::Gain => (0, usize::MAX),
            ObjectKind::Oscillator => (0, 1),
            ObjectKind::Filter => (1, 1),
        }
    }
}

/// A parsed object table, ready to be built.
///
/// Parsing checks every parameter but touches no files, so it doubles as
/// validation.
#[derive(Debug, Clone)]
pub enum ObjectDesc {
    /// A [`Constant`].
    Constant(Constant),
    /// A [`Gain`].
    Gain(Gain),
    /// An [`Oscillator`].
    Oscillator(Oscillator),
    /// A [`Filter`].
    Filter(Filter),
    /// A buffer player whose file is loaded at build time.
    BufferPlayer {
        /// Resolved path of the WAV file.
        path: PathBuf,
        /// Playback speed.
        speed: f32,
        /// Start playing when built.
        auto_play: bool,
    },
}

impl ObjectDesc {
    /// Parse and check an object table.
    pub fn parse(patch: &Patch, config: &ObjectConfig) -> ValidationResult<Self> {
        let kind = ObjectKind::from_name(&config.object_type).ok_or_else(|| {
            ValidationError::UnknownObjectType {
                object: config.id.clone(),
                object_type: config.object_type.clone(),
            }
        })?;
        let params = Params { config };
        params.check_names(kind)?;

        let channel_count = match (kind, config.channels) {
            (ObjectKind::BufferPlayer, Some(_)) => {
                return Err(params.invalid("channels", "follows the file's channel count"));
            }
            (_, channels) => channels.unwrap_or(1),
        };
        if kind != ObjectKind::BufferPlayer && !(1..=MAX_CHANNELS).contains(&channel_count) {
            return Err(ValidationError::InvalidChannelCount {
                object: config.id.clone(),
                count: channel_count,
                limit: MAX_CHANNELS,
            });
        }

        let (min_inputs, max_inputs) = kind.input_range();
        if !(min_inputs..=max_inputs).contains(&config.inputs.len()) {
            return Err(ValidationError::InputCount {
                object: config.id.clone(),
                found: config.inputs.len(),
                min: min_inputs,
                max: max_inputs,
            });
        }

        Ok(match kind {
            ObjectKind::Constant => ObjectDesc::Constant(Constant {
                channel_count,
                values: params.list("value", 0.0)?,
            }),
            ObjectKind::Gain => ObjectDesc::Gain(Gain {
                channel_count,
                gains: params.list("gain", 1.0)?,
            }),
            ObjectKind::Oscillator => {
                let waveform = match params.text("waveform")? {
                    Some(name) => Waveform::from_name(name)
                        .ok_or_else(|| params.invalid("waveform", "expected sine, saw, square or triangle"))?,
                    None => Waveform::Sine,
                };
                let mut osc = Oscillator::new(waveform);
                osc.channel_count = channel_count;
                osc.frequencies = params.list("frequency", 440.0)?;
                osc.amplitudes = params.list("amplitude", 1.0)?;
                osc.phases = params.list("phase", 0.0)?;
                ObjectDesc::Oscillator(osc)
            }
            ObjectKind::Filter => {
                let defaults = Filter::default();
                let mode = match params.text("mode")? {
                    Some(name) => FilterMode::from_name(name)
                        .ok_or_else(|| params.invalid("mode", "expected lowpass, highpass, bandpass or notch"))?,
                    None => defaults.mode,
                };
                ObjectDesc::Filter(Filter {
                    channel_count,
                    mode,
                    frequencies: params.list_or("frequency", defaults.frequencies)?,
                    resonances: params.list_or("resonance", defaults.resonances)?,
                    bands: params.list_or("band", defaults.bands)?,
                    gains: params.list_or("gain", defaults.gains)?,
                })
            }
            ObjectKind::BufferPlayer => {
                let file = params
                    .text("file")?
                    .ok_or_else(|| params.invalid("file", "a WAV file path is required"))?;
                ObjectDesc::BufferPlayer {
                    path: patch.resolve_path(file),
                    speed: params.scalar("speed", 1.0)?,
                    auto_play: params.flag("auto_play", true)?,
                }
            }
        })
    }

    /// Turn the description into an engine object, loading files as needed.
    pub fn into_object(self) -> Result<Box<dyn AudioObject>, ConfigError> {
        Ok(match self {
            ObjectDesc::Constant(object) => Box::new(object),
            ObjectDesc::Gain(object) => Box::new(object),
            ObjectDesc::Oscillator(object) => Box::new(object),
            ObjectDesc::Filter(object) => Box::new(object),
            ObjectDesc::BufferPlayer {
                path,
                speed,
                auto_play,
            } => {
                let (buffer, _) = strata_io::read_wav(&path)
                    .map_err(|source| ConfigError::LoadAudio { path, source })?;
                let mut player = BufferPlayer::new(buffer);
                player.speed = speed;
                player.auto_play = auto_play;
                Box::new(player)
            }
        })
    }
}

/// Typed access to an object's parameter table.
struct Params<'a> {
    config: &'a ObjectConfig,
}

impl Params<'_> {
    fn invalid(&self, param: &str, reason: impl Into<String>) -> ValidationError {
        ValidationError::InvalidParameter {
            object: self.config.id.clone(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    fn check_names(&self, kind: ObjectKind) -> ValidationResult<()> {
        let unknown: Vec<ValidationError> = self
            .config
            .params
            .keys()
            .filter(|key| !kind.params().contains(&key.as_str()))
            .map(|key| ValidationError::UnknownParameter {
                object: self.config.id.clone(),
                param: key.clone(),
            })
            .collect();
        ValidationError::collect(unknown)
    }

    fn get(&self, param: &str) -> Option<&ParamValue> {
        self.config.params.get(param)
    }

    fn list(&self, param: &str, default: f32) -> ValidationResult<Vec<f32>> {
        self.list_or(param, vec![default])
    }

    fn list_or(&self, param: &str, default: Vec<f32>) -> ValidationResult<Vec<f32>> {
        match self.get(param) {
            None => Ok(default),
            Some(value) => match value.as_f32_list() {
                Some(list) if !list.is_empty() => Ok(list),
                _ => Err(self.invalid(param, "expected a number or a list of numbers")),
            },
        }
    }

    fn scalar(&self, param: &str, default: f32) -> ValidationResult<f32> {
        match self.get(param) {
            None => Ok(default),
            Some(value) => value
                .as_f32()
                .ok_or_else(|| self.invalid(param, "expected a number")),
        }
    }

    fn text(&self, param: &str) -> ValidationResult<Option<&str>> {
        match self.get(param) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(param, "expected a string")),
        }
    }

    fn flag(&self, param: &str, default: bool) -> ValidationResult<bool> {
        match self.get(param) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.invalid(param, "expected true or false")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(config: &ObjectConfig) -> ValidationResult<ObjectDesc> {
        ObjectDesc::parse(&Patch::default(), config)
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ObjectKind::from_name("reverb"), None);
    }

    #[test]
    fn test_oscillator_params() {
        let config = ObjectConfig::new("osc", "oscillator")
            .with_channels(2)
            .with_param("waveform", "square")
            .with_param("frequency", vec![110.0, 220.0])
            .with_param("amplitude", "50%");
        let ObjectDesc::Oscillator(osc) = parse(&config).unwrap() else {
            panic!("expected an oscillator");
        };
        assert_eq!(osc.channel_count, 2);
        assert_eq!(osc.frequencies, vec![110.0, 220.0]);
        assert_eq!(osc.amplitudes, vec![0.5]);
        assert_eq!(osc.phases, vec![0.0]);
    }

    #[test]
    fn test_filter_defaults_and_mode() {
        let config = ObjectConfig::new("hp", "filter")
            .with_input("src")
            .with_param("mode", "highpass");
        let ObjectDesc::Filter(filter) = parse(&config).unwrap() else {
            panic!("expected a filter");
        };
        assert_eq!(filter.mode, FilterMode::HighPass);
        assert_eq!(filter.frequencies, Filter::default().frequencies);
    }

    #[test]
    fn test_unknown_type() {
        let err = parse(&ObjectConfig::new("x", "reverb")).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownObjectType { .. }));
    }

    #[test]
    fn test_unknown_parameter() {
        let config = ObjectConfig::new("g", "gain").with_param("drive", 1.0f32);
        assert_eq!(
            parse(&config).unwrap_err(),
            ValidationError::UnknownParameter {
                object: "g".to_string(),
                param: "drive".to_string(),
            }
        );
    }

    #[test]
    fn test_bad_values() {
        let bad_wave = ObjectConfig::new("o", "oscillator").with_param("waveform", "noise");
        assert!(matches!(
            parse(&bad_wave),
            Err(ValidationError::InvalidParameter { ref param, .. }) if param == "waveform"
        ));

        let bad_gain = ObjectConfig::new("g", "gain").with_param("gain", "loud");
        assert!(matches!(
            parse(&bad_gain),
            Err(ValidationError::InvalidParameter { ref param, .. }) if param == "gain"
        ));

        let bad_flag = ObjectConfig::new("p", "buffer_player")
            .with_param("file", "a.wav")
            .with_param("auto_play", 1.0f32);
        assert!(matches!(
            parse(&bad_flag),
            Err(ValidationError::InvalidParameter { ref param, .. }) if param == "auto_play"
        ));
    }

    #[test]
    fn test_channel_limits() {
        let zero = ObjectConfig::new("z", "constant").with_channels(0);
        assert!(matches!(
            parse(&zero),
            Err(ValidationError::InvalidChannelCount { count: 0, .. })
        ));
        let wide = ObjectConfig::new("w", "constant").with_channels(MAX_CHANNELS + 1);
        assert!(parse(&wide).is_err());

        let player = ObjectConfig::new("p", "buffer_player")
            .with_channels(2)
            .with_param("file", "a.wav");
        assert!(matches!(
            parse(&player),
            Err(ValidationError::InvalidParameter { ref param, .. }) if param == "channels"
        ));
    }

    #[test]
    fn test_input_counts() {
        let lonely = ObjectConfig::new("lp", "filter");
        assert!(matches!(
            parse(&lonely),
            Err(ValidationError::InputCount { found: 0, min: 1, .. })
        ));
        let crowded = ObjectConfig::new("c", "constant").with_input("a");
        assert!(matches!(
            parse(&crowded),
            Err(ValidationError::InputCount { found: 1, max: 0, .. })
        ));
    }

    #[test]
    fn test_buffer_player_requires_file() {
        let config = ObjectConfig::new("p", "buffer_player");
        assert!(matches!(
            parse(&config),
            Err(ValidationError::InvalidParameter { ref param, .. }) if param == "file"
        ));
    }

    #[test]
    fn test_missing_file_fails_at_build() {
        let config = ObjectConfig::new("p", "buffer_player")
            .with_param("file", "/nonexistent/strata/loop.wav");
        let desc = parse(&config).unwrap();
        assert!(matches!(
            desc.into_object(),
            Err(ConfigError::LoadAudio { .. })
        ));
    }
}
