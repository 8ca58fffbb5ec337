//! Patch validation.
//!
//! Checks everything that can be checked without touching the engine or the
//! file system: object types, parameter names and values, channel counts,
//! and that every reference names an object declared earlier.
//!
//! # Example
//!
//! ```rust
//! use strata_config::{ObjectConfig, OutputConfig, Patch, validate_patch};
//!
//! let patch = Patch::new("check")
//!     .with_object(ObjectConfig::new("osc", "oscillator"))
//!     .with_output(OutputConfig::new("osc"));
//! validate_patch(&patch).expect("patch should be valid");
//! ```

use std::collections::HashSet;
use thiserror::Error;

use crate::objects::ObjectDesc;
use crate::patch::Patch;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Unknown object type.
    #[error("unknown object type '{object_type}' for '{object}'")]
    UnknownObjectType {
        /// Id of the object.
        object: String,
        /// The unrecognized type name.
        object_type: String,
    },

    /// Two objects share an id.
    #[error("duplicate object id '{0}'")]
    DuplicateId(String),

    /// A reference names no object in the patch.
    #[error("'{from}' refers to unknown object '{target}'")]
    UnresolvedReference {
        /// Object or output holding the reference.
        from: String,
        /// The missing id.
        target: String,
    },

    /// A reference names an object declared later in the patch.
    #[error("'{from}' refers to '{target}', which is declared after it")]
    ForwardReference {
        /// Object holding the reference.
        from: String,
        /// The later id.
        target: String,
    },

    /// Unknown parameter name.
    #[error("unknown parameter '{param}' for object '{object}'")]
    UnknownParameter {
        /// Id of the object.
        object: String,
        /// Name of the unrecognized parameter.
        param: String,
    },

    /// Parameter present but unusable.
    #[error("invalid parameter '{param}' for object '{object}': {reason}")]
    InvalidParameter {
        /// Id of the object.
        object: String,
        /// Name of the parameter.
        param: String,
        /// Description of the problem.
        reason: String,
    },

    /// Channel count outside `1..=limit`.
    #[error("invalid channel count {count} for object '{object}' (allowed 1..={limit})")]
    InvalidChannelCount {
        /// Id of the object.
        object: String,
        /// Requested count.
        count: usize,
        /// Upper limit.
        limit: usize,
    },

    /// Wrong number of input objects for the type.
    #[error("object '{object}' takes {min}..={max} inputs, found {found}")]
    InputCount {
        /// Id of the object.
        object: String,
        /// Inputs listed.
        found: usize,
        /// Fewest accepted.
        min: usize,
        /// Most accepted.
        max: usize,
    },

    /// Output route to a host channel the engine does not have.
    #[error("output '{object}' routes to host channel {channel} ({count} channels)")]
    OutputChannelOutOfRange {
        /// Routed object.
        object: String,
        /// Requested host channel.
        channel: usize,
        /// Host channel count.
        count: usize,
    },

    /// Unusable `[engine]` setting.
    #[error("invalid engine setting '{setting}': {reason}")]
    InvalidEngine {
        /// Name of the setting.
        setting: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl ValidationError {
    /// Fold a list of errors: none is `Ok`, one is itself, more become
    /// [`ValidationError::Multiple`].
    pub fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }

    /// Flattened list of individual errors.
    pub fn errors(&self) -> Vec<&ValidationError> {
        match self {
            ValidationError::Multiple(errors) => errors.iter().flat_map(|e| e.errors()).collect(),
            single => vec![single],
        }
    }
}

/// Validate a whole patch, collecting every problem found.
pub fn validate_patch(patch: &Patch) -> ValidationResult<()> {
    let mut errors = Vec::new();

    let engine = &patch.engine;
    if engine.sample_rate == 0 {
        errors.push(ValidationError::InvalidEngine {
            setting: "sample_rate",
            reason: "must be positive".to_string(),
        });
    }
    if engine.block_size == 0 {
        errors.push(ValidationError::InvalidEngine {
            setting: "block_size",
            reason: "must be positive".to_string(),
        });
    }
    if engine.channels == 0 {
        errors.push(ValidationError::InvalidEngine {
            setting: "channels",
            reason: "must be positive".to_string(),
        });
    }

    let all_ids: HashSet<&str> = patch.objects.iter().map(|o| o.id.as_str()).collect();
    let mut declared: HashSet<&str> = HashSet::new();
    for object in &patch.objects {
        for input in &object.inputs {
            if declared.contains(input.as_str()) {
                continue;
            }
            errors.push(if all_ids.contains(input.as_str()) {
                ValidationError::ForwardReference {
                    from: object.id.clone(),
                    target: input.clone(),
                }
            } else {
                ValidationError::UnresolvedReference {
                    from: object.id.clone(),
                    target: input.clone(),
                }
            });
        }
        if !declared.insert(object.id.as_str()) {
            errors.push(ValidationError::DuplicateId(object.id.clone()));
        }
        if let Err(err) = ObjectDesc::parse(patch, object) {
            errors.extend(err.errors().into_iter().cloned());
        }
    }

    for output in &patch.outputs {
        if !all_ids.contains(output.object.as_str()) {
            errors.push(ValidationError::UnresolvedReference {
                from: format!("output {}", output.object),
                target: output.object.clone(),
            });
        }
        for &channel in output.channels.iter().flatten() {
            if channel >= engine.channels {
                errors.push(ValidationError::OutputChannelOutOfRange {
                    object: output.object.clone(),
                    channel,
                    count: engine.channels,
                });
            }
        }
    }

    ValidationError::collect(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{ObjectConfig, OutputConfig};

    fn chain() -> Patch {
        Patch::new("chain")
            .with_object(ObjectConfig::new("osc", "oscillator"))
            .with_object(ObjectConfig::new("lp", "filter").with_input("osc"))
            .with_output(OutputConfig::new("lp"))
    }

    #[test]
    fn test_valid_patch() {
        assert!(validate_patch(&chain()).is_ok());
    }

    #[test]
    fn test_forward_reference() {
        let patch = Patch::new("backwards")
            .with_object(ObjectConfig::new("lp", "filter").with_input("osc"))
            .with_object(ObjectConfig::new("osc", "oscillator"));
        assert_eq!(
            validate_patch(&patch),
            Err(ValidationError::ForwardReference {
                from: "lp".to_string(),
                target: "osc".to_string(),
            })
        );
    }

    #[test]
    fn test_self_reference_is_forward() {
        let patch =
            Patch::new("loop").with_object(ObjectConfig::new("g", "gain").with_input("g"));
        assert!(matches!(
            validate_patch(&patch),
            Err(ValidationError::ForwardReference { .. })
        ));
    }

    #[test]
    fn test_unresolved_reference() {
        let patch = chain().with_output(OutputConfig::new("reverb"));
        assert!(matches!(
            validate_patch(&patch),
            Err(ValidationError::UnresolvedReference { ref target, .. }) if target == "reverb"
        ));
    }

    #[test]
    fn test_duplicate_id() {
        let patch = chain().with_object(ObjectConfig::new("osc", "constant"));
        assert_eq!(
            validate_patch(&patch),
            Err(ValidationError::DuplicateId("osc".to_string()))
        );
    }

    #[test]
    fn test_output_channel_range() {
        let patch = chain().with_output(OutputConfig::new("osc").with_channels([2]));
        assert!(matches!(
            validate_patch(&patch),
            Err(ValidationError::OutputChannelOutOfRange {
                channel: 2,
                count: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut patch = chain()
            .with_object(ObjectConfig::new("x", "reverb"))
            .with_object(ObjectConfig::new("g", "gain").with_param("drive", 1.0f32));
        patch.engine.block_size = 0;

        let err = validate_patch(&patch).unwrap_err();
        let errors = err.errors();
        assert_eq!(errors.len(), 3);
        assert!(err.to_string().starts_with("multiple validation errors"));
    }

    #[test]
    fn test_collect() {
        assert_eq!(ValidationError::collect(Vec::new()), Ok(()));
        let one = ValidationError::DuplicateId("a".to_string());
        assert_eq!(ValidationError::collect(vec![one.clone()]), Err(one));
    }
}
