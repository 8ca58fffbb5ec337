//! Audio objects: descriptors and their live instances.
//!
//! An [`AudioObject`] is inert configuration (channel count, parameter
//! tables). Instantiating it against a [`NodeManager`] yields an
//! [`AudioObjectInstance`] that owns the registered nodes. Every channel an
//! instance exposes is exactly one mono output pin.

use crate::error::ObjectError;
use crate::manager::NodeManager;
use crate::safe::OutputRef;

/// Live object owning one or more registered nodes.
pub trait AudioObjectInstance: Send {
    /// Instance name, used in logs and errors.
    fn name(&self) -> &str;

    /// Number of output channels.
    fn channel_count(&self) -> usize;

    /// Mono output pin of `channel`, or `None` when out of range.
    fn output_for_channel(&self, channel: usize) -> Option<OutputRef>;

    /// Number of input channels accepting external connections.
    fn input_channel_count(&self) -> usize {
        0
    }

    /// Connect `source` to input channel `channel`.
    fn connect_input(&mut self, channel: usize, _source: OutputRef) -> Result<(), ObjectError> {
        Err(ObjectError::InputOutOfRange {
            object: self.name().to_string(),
            channel,
        })
    }
}

/// Configuration descriptor that can be turned into a live instance.
pub trait AudioObject {
    /// Build the instance. `inputs` must already be constructed; there is no
    /// forward reference.
    fn instantiate(
        &self,
        name: &str,
        manager: &NodeManager,
        inputs: &[&dyn AudioObjectInstance],
    ) -> Result<Box<dyn AudioObjectInstance>, ObjectError>;
}

/// Snapshot of the output pins of an object's inputs.
///
/// Taken once at initialization so the object can rebuild its nodes later
/// without holding references to other instances.
#[derive(Debug, Clone, Default)]
pub struct ObjectInputs {
    sources: Vec<Vec<OutputRef>>,
}

impl ObjectInputs {
    /// Capture every channel of every input instance.
    pub fn from_instances(inputs: &[&dyn AudioObjectInstance]) -> Self {
        let sources = inputs
            .iter()
            .map(|input| {
                (0..input.channel_count())
                    .filter_map(|channel| input.output_for_channel(channel))
                    .collect()
            })
            .collect();
        Self { sources }
    }

    /// Inputs from explicit pin lists, one list per input object.
    pub fn from_outputs(sources: Vec<Vec<OutputRef>>) -> Self {
        Self { sources }
    }

    /// Number of input objects.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether there are no inputs.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Channel count of input `input`.
    pub fn channel_count(&self, input: usize) -> usize {
        self.sources.get(input).map_or(0, Vec::len)
    }

    /// Output feeding `channel` from input `input`. Channels wrap, so a mono
    /// input feeds every channel of a wider object.
    pub fn output_for(&self, input: usize, channel: usize) -> Option<OutputRef> {
        let outputs = self.sources.get(input)?;
        if outputs.is_empty() {
            return None;
        }
        outputs.get(channel % outputs.len()).copied()
    }

    /// Like [`output_for`](Self::output_for) but reports a missing input as a
    /// configuration error of `object`.
    pub fn require(
        &self,
        object: &str,
        input: usize,
        channel: usize,
    ) -> Result<OutputRef, ObjectError> {
        self.output_for(input, channel)
            .ok_or_else(|| ObjectError::MissingInput {
                object: object.to_string(),
                index: input,
            })
    }
}
