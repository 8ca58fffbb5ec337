//! Taps that copy a signal off the audio thread.
//!
//! A [`CaptureNode`] is a permanent root with one input. Every block it takes
//! a preallocated buffer from a free pool, copies its input into it and hands
//! it to the control side. The control side drains filled buffers through
//! [`CaptureReceiver`] and returns them to the pool. When the pool is empty
//! the block is dropped and counted; nothing is allocated on the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use strata_core::{
    AudioObject, AudioObjectInstance, MAX_CHANNELS, Node, NodeManager, ObjectError, ObjectInputs,
    OutputRef, ProcessContext, SafeOwner,
};

/// Blocks in flight per capture node unless configured otherwise.
pub const DEFAULT_CAPTURE_BLOCKS: usize = 64;

/// Control-side end of a [`CaptureNode`].
#[derive(Debug, Clone)]
pub struct CaptureReceiver {
    filled: Receiver<Vec<f32>>,
    free: Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
}

impl CaptureReceiver {
    /// Append every captured block to `out`, oldest first. Returns the number
    /// of samples appended.
    pub fn drain_into(&self, out: &mut Vec<f32>) -> usize {
        let mut appended = 0;
        while let Ok(block) = self.filled.try_recv() {
            out.extend_from_slice(&block);
            appended += block.len();
            // The pool has room for every buffer it ever handed out.
            let _ = self.free.try_send(block);
        }
        appended
    }

    /// Every captured sample so far, as a new vector.
    pub fn drain(&self) -> Vec<f32> {
        let mut out = Vec::new();
        self.drain_into(&mut out);
        out
    }

    /// Blocks lost because the pool was empty.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Copies its single input into pooled buffers.
pub struct CaptureNode {
    free: Receiver<Vec<f32>>,
    filled: Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
}

impl CaptureNode {
    /// Node with `blocks` preallocated buffers of `block_size` samples.
    pub fn new(block_size: usize, blocks: usize) -> (Self, CaptureReceiver) {
        let blocks = blocks.max(1);
        let (free_tx, free_rx) = crossbeam_channel::bounded(blocks);
        let (filled_tx, filled_rx) = crossbeam_channel::bounded(blocks);
        for _ in 0..blocks {
            let _ = free_tx.try_send(Vec::with_capacity(block_size));
        }
        let dropped = Arc::new(AtomicU64::new(0));
        let node = Self {
            free: free_rx,
            filled: filled_tx,
            dropped: Arc::clone(&dropped),
        };
        let receiver = CaptureReceiver {
            filled: filled_rx,
            free: free_tx,
            dropped,
        };
        (node, receiver)
    }
}

impl Node for CaptureNode {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn input_count(&self) -> usize {
        1
    }

    fn output_count(&self) -> usize {
        0
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let Ok(mut block) = self.free.try_recv() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        block.clear();
        block.extend_from_slice(ctx.input(0));
        if self.filled.try_send(block).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Multichannel capture: an object with inputs and no outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// Number of captured channels.
    pub channel_count: usize,
    /// Pool size per channel.
    pub blocks: usize,
}

impl Default for Capture {
    fn default() -> Self {
        Self {
            channel_count: 1,
            blocks: DEFAULT_CAPTURE_BLOCKS,
        }
    }
}

impl Capture {
    /// Build a live capture. Channel `c` is connected to channel `c` of the
    /// first input object when one is given.
    pub fn init(
        &self,
        name: impl Into<String>,
        manager: &NodeManager,
        inputs: &[&dyn AudioObjectInstance],
    ) -> Result<CaptureInstance, ObjectError> {
        let name = name.into();
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(ObjectError::InvalidChannelCount {
                object: name,
                count: self.channel_count,
                limit: MAX_CHANNELS,
            });
        }

        let inputs = ObjectInputs::from_instances(inputs);
        let mut nodes = Vec::with_capacity(self.channel_count);
        for channel in 0..self.channel_count {
            let (node, receiver) = CaptureNode::new(manager.block_size(), self.blocks);
            let node = manager.register_with(node, receiver)?;
            manager.add_root(&node.ptr())?;
            if let Some(source) = inputs.output_for(0, channel) {
                manager.connect(source, node.input(0))?;
            }
            nodes.push(node);
        }
        tracing::debug!("object_init: capture '{name}' with {} channels", nodes.len());
        Ok(CaptureInstance {
            name,
            manager: manager.clone(),
            nodes,
        })
    }
}

impl AudioObject for Capture {
    fn instantiate(
        &self,
        name: &str,
        manager: &NodeManager,
        inputs: &[&dyn AudioObjectInstance],
    ) -> Result<Box<dyn AudioObjectInstance>, ObjectError> {
        Ok(Box::new(self.init(name, manager, inputs)?))
    }
}

/// Live [`Capture`].
#[derive(Debug)]
pub struct CaptureInstance {
    name: String,
    manager: NodeManager,
    nodes: Vec<SafeOwner<CaptureReceiver>>,
}

impl CaptureInstance {
    /// Receiver of channel `channel`.
    pub fn receiver(&self, channel: usize) -> Option<&CaptureReceiver> {
        self.nodes.get(channel).map(|node| node.control())
    }

    /// Drain every channel. The returned vectors may differ in length only
    /// when blocks were dropped.
    pub fn drain(&self) -> Vec<Vec<f32>> {
        self.nodes.iter().map(|node| node.drain()).collect()
    }

    /// Blocks dropped across all channels.
    pub fn dropped_blocks(&self) -> u64 {
        self.nodes.iter().map(|node| node.dropped_blocks()).sum()
    }
}

impl AudioObjectInstance for CaptureInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_count(&self) -> usize {
        0
    }

    fn output_for_channel(&self, _channel: usize) -> Option<OutputRef> {
        None
    }

    fn input_channel_count(&self) -> usize {
        self.nodes.len()
    }

    fn connect_input(&mut self, channel: usize, source: OutputRef) -> Result<(), ObjectError> {
        let node = self
            .nodes
            .get(channel)
            .ok_or_else(|| ObjectError::InputOutOfRange {
                object: self.name.clone(),
                channel,
            })?;
        self.manager.connect(source, node.input(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Constant;
    use strata_core::EngineConfig;

    #[test]
    fn captures_every_block_in_order() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let source = Constant {
            channel_count: 2,
            values: vec![0.25, -0.75],
        }
        .instantiate("dc", &manager, &[])
        .unwrap();
        let capture = Capture {
            channel_count: 2,
            blocks: 8,
        }
        .init("tap", &manager, &[source.as_ref()])
        .unwrap();

        let mut out = [0.0f32; 12];
        processor.process(&mut out);
        let channels = capture.drain();
        assert_eq!(channels[0], vec![0.25; 12]);
        assert_eq!(channels[1], vec![-0.75; 12]);
        assert_eq!(capture.dropped_blocks(), 0);
    }

    #[test]
    fn exhausted_pool_drops_blocks() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 2, 1));
        let capture = Capture {
            channel_count: 1,
            blocks: 2,
        }
        .init("tap", &manager, &[])
        .unwrap();

        let mut out = [0.0f32; 10];
        processor.process(&mut out);
        assert_eq!(capture.dropped_blocks(), 3);
        assert_eq!(capture.drain()[0].len(), 4);

        processor.process(&mut out[..2]);
        assert_eq!(capture.drain()[0].len(), 2);
    }

    #[test]
    fn inputs_can_be_connected_later() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let source = Constant {
            channel_count: 1,
            values: vec![0.5],
        }
        .instantiate("dc", &manager, &[])
        .unwrap();
        let mut capture = Capture::default().init("tap", &manager, &[]).unwrap();
        assert_eq!(capture.input_channel_count(), 1);
        assert!(matches!(
            capture.connect_input(3, source.output_for_channel(0).unwrap()),
            Err(ObjectError::InputOutOfRange { channel: 3, .. })
        ));
        capture
            .connect_input(0, source.output_for_channel(0).unwrap())
            .unwrap();

        let mut out = [0.0f32; 4];
        processor.process(&mut out);
        assert_eq!(capture.receiver(0).unwrap().drain(), vec![0.5; 4]);
    }
}
