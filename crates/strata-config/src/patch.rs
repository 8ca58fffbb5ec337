//! Patch format: the serde model of a TOML patch file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strata_core::EngineConfig;

use crate::ConfigError;

/// A complete patch: engine settings, an ordered list of objects and the
/// routes that feed the host outputs.
///
/// Objects are instantiated in file order and may only take input from
/// objects declared before them.
///
/// # TOML Format
///
/// ```toml
/// name = "Filtered saw"
///
/// [engine]
/// sample_rate = 48000
/// block_size = 256
/// channels = 2
///
/// [[object]]
/// id = "osc"
/// type = "oscillator"
/// channels = 2
/// params = { waveform = "saw", frequency = ["220Hz", "220.5Hz"], amplitude = "-6dB" }
///
/// [[object]]
/// id = "lp"
/// type = "filter"
/// channels = 2
/// inputs = ["osc"]
/// params = { mode = "lowpass", frequency = "1.2kHz", resonance = 0.3 }
///
/// [[output]]
/// object = "lp"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    /// Name of the patch.
    #[serde(default = "default_name")]
    pub name: String,

    /// Optional description of the patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Engine settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Objects in instantiation order.
    #[serde(rename = "object", default)]
    pub objects: Vec<ObjectConfig>,

    /// Routes to host output channels.
    #[serde(rename = "output", default)]
    pub outputs: Vec<OutputConfig>,

    /// Directory relative file parameters are resolved against. Set by
    /// [`Patch::load`].
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_name() -> String {
    "Untitled".to_string()
}

/// The `[engine]` table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames per internal block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Host output channels.
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// Node arena size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<usize>,
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_block_size() -> usize {
    256
}

fn default_channels() -> usize {
    2
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            channels: default_channels(),
            max_nodes: None,
        }
    }
}

impl EngineSection {
    /// Convert to the engine's construction settings.
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(self.sample_rate as f32, self.block_size, self.channels);
        if let Some(max_nodes) = self.max_nodes {
            config.max_nodes = max_nodes;
        }
        config
    }
}

/// One `[[object]]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectConfig {
    /// Unique id other tables refer to.
    pub id: String,

    /// Object type name (e.g., "oscillator", "filter").
    #[serde(rename = "type")]
    pub object_type: String,

    /// Channel count. Defaults to 1; buffer players take theirs from the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,

    /// Ids of the objects feeding this one, in input order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Type specific parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,
}

impl ObjectConfig {
    /// Create an object table with no inputs or parameters.
    pub fn new(id: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            channels: None,
            inputs: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Set the channel count.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Append an input reference.
    pub fn with_input(mut self, id: impl Into<String>) -> Self {
        self.inputs.push(id.into());
        self
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get a parameter value.
    pub fn get_param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }
}

/// One `[[output]]` table: routes an object to host channels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Id of the routed object.
    pub object: String,

    /// Host channel for each object channel, in order. When absent, host
    /// channel `c` takes object channel `c`, wrapping narrower objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<usize>>,
}

impl OutputConfig {
    /// Route every host channel from `object`.
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            channels: None,
        }
    }

    /// Route object channel `i` to host channel `channels[i]`.
    pub fn with_channels(mut self, channels: impl Into<Vec<usize>>) -> Self {
        self.channels = Some(channels.into());
        self
    }

    /// `(object channel, host channel)` pairs for an object with
    /// `object_channels` channels on a host with `host_channels` channels.
    pub fn pairs(&self, object_channels: usize, host_channels: usize) -> Vec<(usize, usize)> {
        match &self.channels {
            Some(map) => map.iter().copied().enumerate().collect(),
            None if object_channels == 0 => Vec::new(),
            None => (0..host_channels)
                .map(|host| (host % object_channels, host))
                .collect(),
        }
    }
}

/// A parameter value as written in TOML.
///
/// Text values accept unit suffixes (see [`parse_param_value`]); lists give
/// one value per channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    /// `true` / `false`.
    Bool(bool),
    /// A plain number.
    Number(f64),
    /// Text: a name, a path or a number with units.
    Text(String),
    /// One value per channel.
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Single numeric value.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ParamValue::Number(n) => Some(*n as f32),
            ParamValue::Text(s) => parse_param_value(s),
            ParamValue::Bool(_) | ParamValue::List(_) => None,
        }
    }

    /// Numeric value per channel. A scalar becomes a one element list.
    pub fn as_f32_list(&self) -> Option<Vec<f32>> {
        match self {
            ParamValue::List(items) => items.iter().map(ParamValue::as_f32).collect(),
            other => other.as_f32().map(|v| vec![v]),
        }
    }

    /// Text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Number(f64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<Vec<f32>> for ParamValue {
    fn from(values: Vec<f32>) -> Self {
        ParamValue::List(values.into_iter().map(ParamValue::from).collect())
    }
}

/// Parse a parameter value string into an f32.
///
/// Supports various formats:
/// - Plain numbers: "0.5", "1.2", "-0.3"
/// - Percentages: "50%", "120%" (divided by 100)
/// - Decibels: "-6dB", "+3dB" (converted to linear gain)
/// - Time in ms: "100ms" (converted to seconds)
/// - Time in s: "1.5s" (kept as seconds)
/// - Frequency in Hz: "440Hz"
/// - Frequency in kHz: "1.2kHz" (converted to Hz)
pub fn parse_param_value(value: &str) -> Option<f32> {
    let value = value.trim();

    if let Some(pct) = value.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|v| v / 100.0);
    }

    if let Some(db) = value
        .strip_suffix("dB")
        .or_else(|| value.strip_suffix("db"))
    {
        return db
            .trim()
            .parse::<f32>()
            .ok()
            .map(strata_core::db_to_linear);
    }

    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse::<f32>().ok().map(|v| v / 1000.0);
    }

    if let Some(s) = value.strip_suffix('s') {
        return s.trim().parse::<f32>().ok();
    }

    if let Some(khz) = value
        .strip_suffix("kHz")
        .or_else(|| value.strip_suffix("khz"))
    {
        return khz.trim().parse::<f32>().ok().map(|v| v * 1000.0);
    }

    if let Some(hz) = value
        .strip_suffix("Hz")
        .or_else(|| value.strip_suffix("hz"))
    {
        return hz.trim().parse::<f32>().ok();
    }

    value.parse::<f32>().ok()
}

impl Patch {
    /// Create an empty patch with default engine settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            engine: EngineSection::default(),
            objects: Vec::new(),
            outputs: Vec::new(),
            base_dir: None,
        }
    }

    /// Create a patch with a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the engine settings.
    pub fn with_engine(mut self, engine: EngineSection) -> Self {
        self.engine = engine;
        self
    }

    /// Append an object.
    pub fn with_object(mut self, object: ObjectConfig) -> Self {
        self.objects.push(object);
        self
    }

    /// Append an output route.
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.outputs.push(output);
        self
    }

    /// Load a patch from a TOML file. Relative file parameters resolve
    /// against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let mut patch = Self::from_toml(&content)?;
        patch.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(
            path = %path.display(),
            objects = patch.objects.len(),
            "patch loaded"
        );
        Ok(patch)
    }

    /// Load a patch from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the patch to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the patch to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find an object table by id.
    pub fn object(&self, id: &str) -> Option<&ObjectConfig> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Resolve a file parameter against [`Patch::base_dir`].
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for Patch {
    fn default() -> Self {
        Self::new(default_name())
    }
}
