//! Declarative patches for the strata audio graph.
//!
//! A patch is a TOML file describing engine settings, an ordered list of
//! audio objects with their parameters and inputs, and the routes that feed
//! the host outputs. This crate parses patches, validates them, and builds
//! them into a live [`NodeManager`](strata_core::NodeManager).
//!
//! # Features
//!
//! - **Patch format**: serde model with `[engine]`, `[[object]]` and
//!   `[[output]]` tables, loaded from and saved to TOML
//! - **Validation**: object types, parameter names and values, channel
//!   counts, and references that must name earlier objects
//! - **Instantiation**: objects are built in declaration order and routed to
//!   host channels; relative file paths resolve against the patch file
//!
//! # Example
//!
//! ```rust
//! use strata_config::Patch;
//!
//! let patch = Patch::from_toml(r#"
//!     [engine]
//!     sample_rate = 48000
//!     block_size = 128
//!     channels = 2
//!
//!     [[object]]
//!     id = "osc"
//!     type = "oscillator"
//!     params = { waveform = "saw", frequency = "110Hz", amplitude = "-12dB" }
//!
//!     [[object]]
//!     id = "lp"
//!     type = "filter"
//!     inputs = ["osc"]
//!     params = { mode = "lowpass", frequency = "800Hz" }
//!
//!     [[output]]
//!     object = "lp"
//! "#).unwrap();
//!
//! let (instance, mut processor) = patch.build().unwrap();
//! assert_eq!(instance.len(), 2);
//!
//! let mut block = vec![0.0f32; 128 * 2];
//! processor.process(&mut block);
//! ```

mod build;
mod error;
mod objects;
mod patch;
mod validation;

pub use build::PatchInstance;
pub use error::ConfigError;
pub use objects::{ObjectDesc, ObjectKind};
pub use patch::{EngineSection, ObjectConfig, OutputConfig, ParamValue, Patch, parse_param_value};
pub use validation::{ValidationError, ValidationResult, validate_patch};
