//! Gain: multiply inputs with each other and with a smoothed scalar.

use strata_core::{
    AudioObject, AudioObjectInstance, LinearSmoothedValue, MultiChannelObject,
    MultiChannelObjectInstance, Node, NodeManager, ObjectError, ObjectInputs, ProcessContext,
    SafeOwner, SmoothedValueHandle,
};

use crate::per_channel;

/// Multiplies all of its inputs together and by a smoothed gain.
///
/// Every input pin takes part in the product, so an unconnected pin reads as
/// silence and silences the output. A node with no input pins outputs the gain
/// itself.
#[derive(Debug)]
pub struct GainNode {
    inputs: usize,
    gain: LinearSmoothedValue,
}

impl GainNode {
    /// Node with `inputs` input pins and initial `gain`.
    pub fn new(inputs: usize, gain: f32) -> (Self, SmoothedValueHandle) {
        let gain = LinearSmoothedValue::new(gain);
        let handle = gain.handle();
        (Self { inputs, gain }, handle)
    }
}

impl Node for GainNode {
    fn name(&self) -> &'static str {
        "gain"
    }

    fn input_count(&self) -> usize {
        self.inputs
    }

    fn output_count(&self) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        for sample in ctx.output(0).iter_mut() {
            *sample = self.gain.next_value();
        }
        for index in 0..self.inputs {
            let input = ctx.input(index);
            for (out, sample) in ctx.output(0).iter_mut().zip(input) {
                *out *= sample;
            }
        }
    }
}

/// Multichannel gain.
///
/// Channel `c` multiplies channel `c` of every input object (wrapping for
/// narrower inputs) by `gains[c]`; the gain table repeats when shorter than
/// the channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct Gain {
    /// Number of output channels.
    pub channel_count: usize,
    /// Gain per channel.
    pub gains: Vec<f32>,
}

impl Default for Gain {
    fn default() -> Self {
        Self {
            channel_count: 1,
            gains: vec![1.0],
        }
    }
}

impl MultiChannelObject for Gain {
    type Control = SmoothedValueHandle;

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn create_node(
        &self,
        channel: usize,
        manager: &NodeManager,
        inputs: &ObjectInputs,
    ) -> Result<SafeOwner<SmoothedValueHandle>, ObjectError> {
        let (node, handle) = GainNode::new(inputs.len(), per_channel(&self.gains, channel, 1.0));
        let node = manager.register_with(node, handle)?;
        for input in 0..inputs.len() {
            if let Some(source) = inputs.output_for(input, channel) {
                manager.connect(source, node.input(input))?;
            }
        }
        Ok(node)
    }
}

impl AudioObject for Gain {
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
    use crate::Constant;
    use strata_core::EngineConfig;

    #[test]
    fn inputs_are_multiplied_together() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let a = Constant {
            channel_count: 1,
            values: vec![0.5],
        }
        .instantiate("a", &manager, &[])
        .unwrap();
        let b = Constant {
            channel_count: 1,
            values: vec![-0.5],
        }
        .instantiate("b", &manager, &[])
        .unwrap();
        let gain = Gain {
            channel_count: 1,
            gains: vec![2.0],
        }
        .instantiate("gain", &manager, &[a.as_ref(), b.as_ref()])
        .unwrap();
        manager
            .route(0, gain.output_for_channel(0).unwrap())
            .unwrap();

        let mut out = [0.0f32; 4];
        processor.process(&mut out);
        assert_eq!(out, [-0.5; 4]);
    }

    #[test]
    fn without_inputs_the_gain_is_the_output() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let (node, handle) = GainNode::new(0, 0.3);
        let node = manager.register_with(node, handle).unwrap();
        manager.route(0, node.output(0)).unwrap();
        let mut out = [0.0f32; 4];
        processor.process(&mut out);
        assert_eq!(out, [0.3; 4]);
    }

    #[test]
    fn unconnected_pin_silences_the_product() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let (node, handle) = GainNode::new(2, 1.0);
        let node = manager.register_with(node, handle).unwrap();
        manager.route(0, node.output(0)).unwrap();
        let mut out = [1.0f32; 4];
        processor.process(&mut out);
        assert_eq!(out, [0.0; 4]);
    }
}
