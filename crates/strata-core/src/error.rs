//! Error types for graph construction and object configuration.
//!
//! Every error here is raised on the control thread, synchronously, at the
//! moment a structural change is requested. The audio thread never produces
//! errors: stale or unconnected inputs read as silence instead.

use crate::safe::NodeHandle;

/// Structural graph errors, detected when a connection or registration is
/// requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The referenced node was never registered or has already been released.
    #[error("node {0} is not registered")]
    NodeNotFound(NodeHandle),

    /// A pin index is outside the node's pin count.
    #[error("{kind} pin {index} out of range for node {node} ({count} available)")]
    PinOutOfRange {
        /// Node owning the pin.
        node: NodeHandle,
        /// `"input"` or `"output"`.
        kind: &'static str,
        /// Requested pin index.
        index: usize,
        /// Number of pins of that kind on the node.
        count: usize,
    },

    /// The connection would close a cycle.
    #[error("connecting {from} -> {to} would create a cycle")]
    CycleDetected {
        /// Source node of the rejected edge.
        from: NodeHandle,
        /// Destination node of the rejected edge.
        to: NodeHandle,
    },

    /// The two nodes belong to different managers, which may run at different
    /// sample rates and block sizes.
    #[error("node {0} belongs to a different node manager")]
    ManagerMismatch(NodeHandle),

    /// A preallocated engine table is full.
    #[error("{what} capacity exhausted ({capacity})")]
    CapacityExceeded {
        /// Which table overflowed.
        what: &'static str,
        /// Configured capacity.
        capacity: usize,
    },

    /// Host output channel index is out of range.
    #[error("output channel {channel} out of range ({count} channels)")]
    ChannelOutOfRange {
        /// Requested channel.
        channel: usize,
        /// Number of host output channels.
        count: usize,
    },
}

/// Configuration errors raised while initializing or resizing audio objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    /// A per-channel node exposes more or fewer than one output.
    #[error("nodes in '{object}' have to be mono: channel {channel} has {outputs} outputs")]
    NotMono {
        /// Object name.
        object: String,
        /// Channel whose node was rejected.
        channel: usize,
        /// Output count of the rejected node.
        outputs: usize,
    },

    /// Requested channel count is zero or above the channel limit.
    #[error("invalid channel count {count} for '{object}' (allowed 1..={limit})")]
    InvalidChannelCount {
        /// Object name.
        object: String,
        /// Requested count.
        count: usize,
        /// Channel limit.
        limit: usize,
    },

    /// Polyphonic pool configured with zero voices.
    #[error("'{0}' needs at least one voice")]
    InvalidVoiceCount(String),

    /// A voice produced a different number of outputs than the object has
    /// channels.
    #[error("voice {voice} of '{object}' has {found} outputs, expected {expected}")]
    ChannelMismatch {
        /// Object name.
        object: String,
        /// Voice index.
        voice: usize,
        /// Object channel count.
        expected: usize,
        /// Voice output count.
        found: usize,
    },

    /// A required input object was not supplied.
    #[error("'{object}' requires input {index}")]
    MissingInput {
        /// Object name.
        object: String,
        /// Missing input slot.
        index: usize,
    },

    /// The object has no input channel with this index.
    #[error("'{object}' has no input channel {channel}")]
    InputOutOfRange {
        /// Object name.
        object: String,
        /// Requested input channel.
        channel: usize,
    },

    /// A parameter value is unusable.
    #[error("invalid parameter '{name}' for '{object}': {reason}")]
    InvalidParameter {
        /// Object name.
        object: String,
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Graph-level failure while wiring the object.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl ObjectError {
    /// Create an [`ObjectError::InvalidParameter`].
    pub fn invalid_parameter(
        object: impl Into<String>,
        name: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            object: object.into(),
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_mono_message_names_object_and_channel() {
        let err = ObjectError::NotMono {
            object: "stereo_gain".to_string(),
            channel: 1,
            outputs: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("stereo_gain"));
        assert!(msg.contains("channel 1"));
        assert!(msg.contains("2 outputs"));
    }

    #[test]
    fn graph_error_converts_into_object_error() {
        let handle = NodeHandle::new(3, 1);
        let err: ObjectError = GraphError::NodeNotFound(handle).into();
        assert!(matches!(err, ObjectError::Graph(GraphError::NodeNotFound(h)) if h == handle));
        assert_eq!(err.to_string(), "node #3.1 is not registered");
    }

    #[test]
    fn invalid_parameter_helper() {
        let err = ObjectError::invalid_parameter("osc", "frequency", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid parameter 'frequency' for 'osc': must be positive"
        );
    }
}
