//! Constant-value sources.

use strata_core::{
    AudioObject, AudioObjectInstance, LinearSmoothedValue, MultiChannelObject,
    MultiChannelObjectInstance, Node, NodeManager, ObjectError, ObjectInputs, ProcessContext,
    SafeOwner, SmoothedValueHandle,
};

use crate::per_channel;

/// Outputs a smoothed constant. Useful as a DC offset, a modulation source or
/// a control signal feeding another node's input.
#[derive(Debug)]
pub struct ConstantNode {
    value: LinearSmoothedValue,
}

impl ConstantNode {
    /// Node starting at `value`, plus the handle that changes it.
    pub fn new(value: f32) -> (Self, SmoothedValueHandle) {
        let value = LinearSmoothedValue::new(value);
        let handle = value.handle();
        (Self { value }, handle)
    }
}

impl Node for ConstantNode {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn output_count(&self) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        for sample in ctx.output(0).iter_mut() {
            *sample = self.value.next_value();
        }
    }
}

/// Multichannel constant. `values` repeats when shorter than the channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    /// Number of channels.
    pub channel_count: usize,
    /// Value per channel.
    pub values: Vec<f32>,
}

impl Default for Constant {
    fn default() -> Self {
        Self {
            channel_count: 1,
            values: vec![0.0],
        }
    }
}

impl MultiChannelObject for Constant {
    type Control = SmoothedValueHandle;

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn create_node(
        &self,
        channel: usize,
        manager: &NodeManager,
        _inputs: &ObjectInputs,
    ) -> Result<SafeOwner<SmoothedValueHandle>, ObjectError> {
        let (node, handle) = ConstantNode::new(per_channel(&self.values, channel, 0.0));
        Ok(manager.register_with(node, handle)?)
    }
}

impl AudioObject for Constant {
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
    use strata_core::EngineConfig;

    #[test]
    fn values_repeat_across_channels() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 3));
        let object = Constant {
            channel_count: 3,
            values: vec![0.25, -0.5],
        };
        let instance = object.instantiate("dc", &manager, &[]).unwrap();
        for channel in 0..3 {
            manager
                .route(channel, instance.output_for_channel(channel).unwrap())
                .unwrap();
        }
        let mut out = [0.0f32; 12];
        processor.process(&mut out);
        assert_eq!(&out[..3], &[0.25, -0.5, 0.25]);
    }

    #[test]
    fn handle_ramps_the_value() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let (node, handle) = ConstantNode::new(0.0);
        let node = manager.register_with(node, handle).unwrap();
        manager.route(0, node.output(0)).unwrap();
        node.set_value(1.0, 4);
        let mut out = [0.0f32; 4];
        processor.process(&mut out);
        assert_eq!(out, [0.25, 0.5, 0.75, 1.0]);
    }
}
