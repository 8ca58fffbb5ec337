//! Summing node.

use crate::node::{Node, ProcessContext};

/// Sums `n` inputs into one output. Unconnected inputs contribute nothing.
#[derive(Debug, Clone, Copy)]
pub struct MixNode {
    inputs: usize,
}

impl MixNode {
    /// Mixer with `inputs` input pins.
    pub fn new(inputs: usize) -> Self {
        Self { inputs }
    }
}

impl Node for MixNode {
    fn name(&self) -> &'static str {
        "mix"
    }

    fn input_count(&self) -> usize {
        self.inputs
    }

    fn output_count(&self) -> usize {
        1
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        ctx.output(0).fill(0.0);
        for index in 0..self.inputs {
            if !ctx.is_connected(index) {
                continue;
            }
            let input = ctx.input(index);
            for (out, sample) in ctx.output(0).iter_mut().zip(input) {
                *out += sample;
            }
        }
    }
}
