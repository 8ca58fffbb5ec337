//! The processing unit contract.
//!
//! A [`Node`] turns zero or more input blocks into one or more output blocks.
//! It is constructed on the control thread, handed to
//! [`NodeManager::register`](crate::NodeManager::register), and from then on
//! only the audio thread calls into it.
//!
//! # Evaluation
//!
//! Evaluation is pull-based and memoized. Once per block the processor pulls
//! every root; pulling a node first pulls the nodes feeding its connected
//! inputs, then calls [`Node::process`]. A node already computed in the current
//! block is not computed again, so fan-out costs nothing extra and no
//! topological sort is needed. Recursion depth is bounded by graph depth.
//!
//! # Real-time rules
//!
//! `process` runs on the audio thread: no allocation, no locks, no blocking.
//! Parameters arrive through the smoothing primitives or bounded message
//! queues drained at the top of `process`.

use crate::pin::{InputPin, OutputPin};
use crate::processor::{NodeEntry, resolve};

/// A unit of audio processing.
pub trait Node: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }

    /// Number of input pins. Fixed for the node's lifetime.
    fn input_count(&self) -> usize {
        0
    }

    /// Number of output pins. Fixed for the node's lifetime.
    fn output_count(&self) -> usize;

    /// Compute one block. Every output sample in `ctx.output(i)` must be
    /// written; the buffer still holds the previous block otherwise.
    fn process(&mut self, ctx: &mut ProcessContext<'_>);

    /// Called before registration and whenever the engine sample rate changes,
    /// never while a block is being processed.
    fn sample_rate_changed(&mut self, _sample_rate: f32) {}
}

/// View of a node's pins for the duration of one `process` call.
pub struct ProcessContext<'a> {
    pub(crate) slots: &'a [Option<Box<NodeEntry>>],
    pub(crate) inputs: &'a [InputPin],
    pub(crate) outputs: &'a mut [OutputPin],
    pub(crate) silence: &'a [f32],
    pub(crate) frames: usize,
    pub(crate) sample_rate: f32,
    pub(crate) block: u64,
}

impl<'a> ProcessContext<'a> {
    /// Frames in this block (at most the engine block size).
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Engine sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Monotonic block counter, starting at 1.
    #[inline]
    pub fn block(&self) -> u64 {
        self.block
    }

    /// Samples arriving at input `index`.
    ///
    /// Unconnected inputs, inputs whose source was released, and out-of-range
    /// indices all read as silence.
    #[inline]
    pub fn input(&self, index: usize) -> &'a [f32] {
        let silence: &'a [f32] = self.silence;
        self.source(index).unwrap_or(&silence[..self.frames])
    }

    /// Whether input `index` currently reads from a live source.
    pub fn is_connected(&self, index: usize) -> bool {
        self.source(index).is_some()
    }

    /// Buffer for output `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= output_count()`.
    #[inline]
    pub fn output(&mut self, index: usize) -> &mut [f32] {
        &mut self.outputs[index].buffer[..self.frames]
    }

    fn source(&self, index: usize) -> Option<&'a [f32]> {
        let inputs: &'a [InputPin] = self.inputs;
        let source = inputs.get(index)?.source?;
        resolve(self.slots, source, self.block).map(|buffer| &buffer[..self.frames])
    }
}
