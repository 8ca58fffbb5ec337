//! Multichannel objects built from one mono node per channel.
//!
//! [`MultiChannelObject`] describes how to build the node of one channel;
//! [`MultiChannelObjectInstance`] owns the resulting nodes and exposes them as
//! a single [`AudioObjectInstance`]. The node vector is rebuilt wholesale on
//! resize and is only ever touched on the control thread; the audio thread
//! sees the nodes through their arena handles.
//!
//! [`ParallelNodeObject`] covers the common case where the per-channel
//! construction is a closure.

use core::marker::PhantomData;

use crate::error::ObjectError;
use crate::manager::NodeManager;
use crate::object::{AudioObjectInstance, ObjectInputs};
use crate::safe::{OutputRef, SafeOwner};

/// Upper bound on channels per object.
pub const MAX_CHANNELS: usize = 64;

/// Per-channel node factory.
pub trait MultiChannelObject: Send {
    /// Control surface of one channel's node.
    type Control: Send;

    /// Channel count used by [`MultiChannelObjectInstance::init`].
    fn channel_count(&self) -> usize;

    /// Build and register the node for `channel`. The node must expose exactly
    /// one output.
    fn create_node(
        &self,
        channel: usize,
        manager: &NodeManager,
        inputs: &ObjectInputs,
    ) -> Result<SafeOwner<Self::Control>, ObjectError>;
}

/// Live multichannel object.
pub struct MultiChannelObjectInstance<O: MultiChannelObject> {
    name: String,
    object: O,
    manager: NodeManager,
    inputs: ObjectInputs,
    nodes: Vec<SafeOwner<O::Control>>,
}

impl<O: MultiChannelObject> MultiChannelObjectInstance<O> {
    /// Build one node per channel of `object`.
    ///
    /// On error nothing stays registered: nodes built so far are released.
    pub fn init(
        object: O,
        name: impl Into<String>,
        manager: &NodeManager,
        inputs: &[&dyn AudioObjectInstance],
    ) -> Result<Self, ObjectError> {
        Self::with_inputs(object, name, manager, ObjectInputs::from_instances(inputs))
    }

    /// [`init`](Self::init) with an explicit input snapshot.
    pub fn with_inputs(
        object: O,
        name: impl Into<String>,
        manager: &NodeManager,
        inputs: ObjectInputs,
    ) -> Result<Self, ObjectError> {
        let name = name.into();
        let count = object.channel_count();
        check_channel_count(&name, count)?;

        let nodes = (0..count)
            .map(|channel| build_channel(&object, &name, channel, manager, &inputs))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("object_init: '{name}' with {count} channels");
        Ok(Self {
            name,
            object,
            manager: manager.clone(),
            inputs,
            nodes,
        })
    }

    /// Rebuild every channel for a new channel count.
    ///
    /// All previous nodes are released. If building a channel fails the
    /// failure is logged, the rebuild stops, and the instance keeps the
    /// channels rebuilt so far. A count outside `1..=MAX_CHANNELS` is rejected
    /// before anything changes.
    pub fn create(&mut self, channel_count: usize) -> Result<(), ObjectError> {
        check_channel_count(&self.name, channel_count)?;

        let mut rebuilt = Vec::with_capacity(channel_count);
        let mut outcome = Ok(());
        for channel in 0..channel_count {
            match build_channel(
                &self.object,
                &self.name,
                channel,
                &self.manager,
                &self.inputs,
            ) {
                Ok(node) => rebuilt.push(node),
                Err(err) => {
                    tracing::warn!(
                        "failed to resize '{}' to {channel_count} channels at channel {channel}: {err}",
                        self.name
                    );
                    outcome = Err(err);
                    break;
                }
            }
        }
        self.nodes = rebuilt;
        outcome
    }

    /// Node of channel `index`, or `None` when out of range.
    pub fn channel(&self, index: usize) -> Option<&SafeOwner<O::Control>> {
        self.nodes.get(index)
    }

    /// All channel nodes in order.
    pub fn channels(&self) -> &[SafeOwner<O::Control>] {
        &self.nodes
    }

    /// Descriptor the instance was built from.
    pub fn object(&self) -> &O {
        &self.object
    }

    /// Mutable descriptor; changes apply at the next [`create`](Self::create).
    pub fn object_mut(&mut self) -> &mut O {
        &mut self.object
    }

    /// Manager owning the nodes.
    pub fn manager(&self) -> &NodeManager {
        &self.manager
    }
}

impl<O: MultiChannelObject> AudioObjectInstance for MultiChannelObjectInstance<O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_count(&self) -> usize {
        self.nodes.len()
    }

    fn output_for_channel(&self, channel: usize) -> Option<OutputRef> {
        self.nodes.get(channel).map(|node| node.output(0))
    }
}

impl<O: MultiChannelObject> core::fmt::Debug for MultiChannelObjectInstance<O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MultiChannelObjectInstance")
            .field("name", &self.name)
            .field("channels", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

fn check_channel_count(name: &str, count: usize) -> Result<(), ObjectError> {
    if (1..=MAX_CHANNELS).contains(&count) {
        Ok(())
    } else {
        Err(ObjectError::InvalidChannelCount {
            object: name.to_string(),
            count,
            limit: MAX_CHANNELS,
        })
    }
}

fn build_channel<O: MultiChannelObject>(
    object: &O,
    name: &str,
    channel: usize,
    manager: &NodeManager,
    inputs: &ObjectInputs,
) -> Result<SafeOwner<O::Control>, ObjectError> {
    let node = object.create_node(channel, manager, inputs)?;
    let outputs = node.ptr().output_count();
    if outputs != 1 {
        return Err(ObjectError::NotMono {
            object: name.to_string(),
            channel,
            outputs,
        });
    }
    Ok(node)
}

/// [`MultiChannelObject`] whose per-channel node comes from a closure.
///
/// ```rust
/// use strata_core::{EngineConfig, MultiChannelObjectInstance, NodeManager, ParallelNodeObject};
/// # use strata_core::{Node, ProcessContext};
/// # struct Silence;
/// # impl Node for Silence {
/// #     fn output_count(&self) -> usize { 1 }
/// #     fn process(&mut self, ctx: &mut ProcessContext<'_>) { ctx.output(0).fill(0.0); }
/// # }
/// let (manager, _processor) = NodeManager::new(EngineConfig::default());
/// let object = ParallelNodeObject::new(4, |_channel, manager: &NodeManager, _inputs| {
///     Ok(manager.register(Silence)?)
/// });
/// let instance = MultiChannelObjectInstance::init(object, "silence", &manager, &[]).unwrap();
/// assert!(instance.channel(3).is_some());
/// assert!(instance.channel(4).is_none());
/// ```
pub struct ParallelNodeObject<C, F> {
    channel_count: usize,
    factory: F,
    _control: PhantomData<fn() -> C>,
}

impl<C, F> ParallelNodeObject<C, F>
where
    F: Fn(usize, &NodeManager, &ObjectInputs) -> Result<SafeOwner<C>, ObjectError> + Send,
{
    /// Object with `channel_count` channels built by `factory`.
    pub fn new(channel_count: usize, factory: F) -> Self {
        Self {
            channel_count,
            factory,
            _control: PhantomData,
        }
    }

    /// Change the channel count used by the next `init`.
    pub fn set_channel_count(&mut self, channel_count: usize) {
        self.channel_count = channel_count;
    }
}

impl<C, F> MultiChannelObject for ParallelNodeObject<C, F>
where
    C: Send,
    F: Fn(usize, &NodeManager, &ObjectInputs) -> Result<SafeOwner<C>, ObjectError> + Send,
{
    type Control = C;

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn create_node(
        &self,
        channel: usize,
        manager: &NodeManager,
        inputs: &ObjectInputs,
    ) -> Result<SafeOwner<C>, ObjectError> {
        (self.factory)(channel, manager, inputs)
    }
}
