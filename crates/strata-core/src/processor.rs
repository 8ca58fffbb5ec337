//! Audio-thread side of the engine.
//!
//! [`AudioProcessor`] owns the node arena. It is created together with its
//! [`NodeManager`](crate::NodeManager) and moved into the host audio callback.
//!
//! # Block cycle
//!
//! 1. Apply pending structural commands (insert, remove, connect, route,
//!    sample rate). This is the only point where the graph changes, so no
//!    node is ever mutated structurally while a block is running.
//! 2. Bump the block stamp and pull every root node and every routed output.
//! 3. Sum routed outputs into the host's interleaved buffer.
//!
//! Removed nodes leave the arena in step 1 and travel back to the control
//! thread over a bounded queue sized to the arena, so the audio thread never
//! frees them and never blocks on the send. Once the control side is gone
//! they are parked in a preallocated list instead and freed when the
//! processor itself is dropped.

use crossbeam_channel::{Receiver, Sender};

use crate::manager::EngineConfig;
use crate::node::{Node, ProcessContext};
use crate::pin::{InputPin, OutputPin, PinSource};
use crate::safe::NodeHandle;

/// Arena slot contents: a node and its pins.
pub(crate) struct NodeEntry {
    pub index: u32,
    pub generation: u32,
    pub node: Box<dyn Node>,
    pub inputs: Vec<InputPin>,
    pub outputs: Vec<OutputPin>,
    /// Block stamp of the last pull, set before inputs are pulled.
    pub visited: u64,
}

impl NodeEntry {
    pub fn new(handle: NodeHandle, node: Box<dyn Node>, block_size: usize) -> Self {
        let inputs = vec![InputPin::default(); node.input_count()];
        let outputs = (0..node.output_count())
            .map(|_| OutputPin::new(block_size))
            .collect();
        Self {
            index: handle.index,
            generation: handle.generation,
            node,
            inputs,
            outputs,
            visited: 0,
        }
    }
}

/// Structural change queued by the control thread.
pub(crate) enum Command {
    Insert { index: u32, entry: Box<NodeEntry> },
    Remove(NodeHandle),
    Connect {
        node: NodeHandle,
        pin: u32,
        source: Option<PinSource>,
    },
    Route { channel: u32, source: PinSource },
    Unroute { channel: u32, source: PinSource },
    AddRoot(NodeHandle),
    RemoveRoot(NodeHandle),
    SetSampleRate(f32),
}

/// Output buffer of `source` if it was computed in `block`.
#[inline]
pub(crate) fn resolve(
    slots: &[Option<Box<NodeEntry>>],
    source: PinSource,
    block: u64,
) -> Option<&[f32]> {
    let entry = slots.get(source.node.index())?.as_deref()?;
    if entry.generation != source.node.generation {
        return None;
    }
    let pin = entry.outputs.get(source.pin as usize)?;
    pin.is_current(block).then_some(pin.buffer.as_slice())
}

/// Counters describing recent processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Blocks processed since creation.
    pub blocks_processed: u64,
    /// Nodes whose `process` ran during the last block.
    pub nodes_processed: usize,
    /// Nodes currently in the arena.
    pub live_nodes: usize,
}

/// Real-time half of the engine. Move it into the audio callback.
pub struct AudioProcessor {
    slots: Vec<Option<Box<NodeEntry>>>,
    roots: Vec<NodeHandle>,
    routes: Vec<Vec<PinSource>>,
    silence: Vec<f32>,
    commands: Receiver<Command>,
    garbage: Sender<Box<NodeEntry>>,
    /// Entries nobody can take back anymore. Capacity is the arena size.
    parked: Vec<Box<NodeEntry>>,
    command_budget: usize,
    sample_rate: f32,
    block_size: usize,
    block: u64,
    frames: usize,
    stats: ProcessorStats,
}

impl AudioProcessor {
    pub(crate) fn new(
        config: &EngineConfig,
        commands: Receiver<Command>,
        garbage: Sender<Box<NodeEntry>>,
    ) -> Self {
        Self {
            slots: (0..config.max_nodes).map(|_| None).collect(),
            roots: Vec::with_capacity(config.max_nodes),
            routes: (0..config.output_channels)
                .map(|_| Vec::with_capacity(config.max_nodes))
                .collect(),
            silence: vec![0.0; config.block_size],
            commands,
            garbage,
            parked: Vec::with_capacity(config.max_nodes),
            command_budget: config.command_capacity,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            block: 0,
            frames: 0,
            stats: ProcessorStats::default(),
        }
    }

    /// Fill an interleaved host buffer of `frames × output_channels` samples.
    ///
    /// The buffer is processed in internal blocks of at most the engine block
    /// size; pending structural changes are applied before each one. Trailing
    /// samples that do not form a whole frame are zeroed.
    pub fn process(&mut self, output: &mut [f32]) {
        let channels = self.routes.len();
        let total_frames = output.len() / channels;
        output[total_frames * channels..].fill(0.0);

        let mut offset = 0;
        while offset < total_frames {
            let frames = (total_frames - offset).min(self.block_size);
            self.drain_commands();
            self.run_block(frames);

            let block = &mut output[offset * channels..(offset + frames) * channels];
            self.mix_routes(block, channels);
            offset += frames;
        }
    }

    /// Apply pending structural changes without processing audio.
    ///
    /// Useful when the host stops calling [`process`](Self::process) but the
    /// control thread still releases nodes.
    pub fn apply_pending(&mut self) {
        self.drain_commands();
    }

    /// Current engine sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Maximum frames per internal block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Host output channel count.
    pub fn output_channels(&self) -> usize {
        self.routes.len()
    }

    /// Processing counters.
    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    fn drain_commands(&mut self) {
        for _ in 0..self.command_budget {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(_) => break,
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Insert { index, entry } => {
                if let Some(slot) = self.slots.get_mut(index as usize) {
                    if let Some(previous) = slot.replace(entry) {
                        self.discard(previous);
                    } else {
                        self.stats.live_nodes += 1;
                    }
                }
            }
            Command::Remove(handle) => {
                let Some(slot) = self.slots.get_mut(handle.index()) else {
                    return;
                };
                if slot.as_ref().is_some_and(|e| e.generation == handle.generation) {
                    if let Some(entry) = slot.take() {
                        self.stats.live_nodes -= 1;
                        self.roots.retain(|root| *root != handle);
                        for routes in &mut self.routes {
                            routes.retain(|source| source.node != handle);
                        }
                        self.discard(entry);
                    }
                }
            }
            Command::Connect { node, pin, source } => {
                if let Some(entry) = self.entry_mut(node) {
                    if let Some(input) = entry.inputs.get_mut(pin as usize) {
                        input.source = source;
                    }
                }
            }
            Command::Route { channel, source } => {
                if let Some(routes) = self.routes.get_mut(channel as usize) {
                    // Capacity is checked on the control side; never grow here.
                    if routes.len() < routes.capacity() {
                        routes.push(source);
                    }
                }
            }
            Command::Unroute { channel, source } => {
                if let Some(routes) = self.routes.get_mut(channel as usize) {
                    if let Some(position) = routes.iter().position(|s| *s == source) {
                        routes.swap_remove(position);
                    }
                }
            }
            Command::AddRoot(handle) => {
                if self.roots.len() < self.roots.capacity() && !self.roots.contains(&handle) {
                    self.roots.push(handle);
                }
            }
            Command::RemoveRoot(handle) => {
                self.roots.retain(|root| *root != handle);
            }
            Command::SetSampleRate(sample_rate) => {
                self.sample_rate = sample_rate;
                for entry in self.slots.iter_mut().flatten() {
                    entry.node.sample_rate_changed(sample_rate);
                }
            }
        }
    }

    fn entry_mut(&mut self, handle: NodeHandle) -> Option<&mut NodeEntry> {
        self.slots
            .get_mut(handle.index())?
            .as_deref_mut()
            .filter(|entry| entry.generation == handle.generation)
    }

    /// Hand a detached entry back to the control thread for freeing.
    fn discard(&mut self, entry: Box<NodeEntry>) {
        // The queue holds one entry per arena slot, so it only rejects an
        // entry once the manager is gone. The arena never holds more than
        // `max_nodes` entries, so parking never grows the vector.
        if let Err(err) = self.garbage.try_send(entry) {
            self.parked.push(err.into_inner());
        }
    }

    /// Detached nodes waiting for the processor to be dropped.
    pub fn parked_nodes(&self) -> usize {
        self.parked.len()
    }

    fn run_block(&mut self, frames: usize) {
        self.block += 1;
        self.frames = frames;
        self.stats.nodes_processed = 0;

        for i in 0..self.roots.len() {
            let root = self.roots[i];
            self.pull(root);
        }
        for channel in 0..self.routes.len() {
            for i in 0..self.routes[channel].len() {
                let source = self.routes[channel][i];
                self.pull(source.node);
            }
        }
        self.stats.blocks_processed += 1;
    }

    /// Compute `handle` for the current block unless already done.
    fn pull(&mut self, handle: NodeHandle) {
        let index = handle.index();
        let block = self.block;
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        if entry.visited == block {
            return;
        }
        entry.visited = block;

        let input_count = entry.inputs.len();
        for pin in 0..input_count {
            let source = self.slots[index]
                .as_ref()
                .and_then(|entry| entry.inputs[pin].source);
            if let Some(source) = source {
                self.pull(source.node);
            }
        }

        // Lift the entry out so its outputs can be written while upstream
        // buffers are read from the rest of the arena.
        let Some(mut entry) = self.slots[index].take() else {
            return;
        };
        {
            let NodeEntry {
                node,
                inputs,
                outputs,
                ..
            } = &mut *entry;
            let mut ctx = ProcessContext {
                slots: &self.slots,
                inputs,
                outputs,
                silence: &self.silence,
                frames: self.frames,
                sample_rate: self.sample_rate,
                block: self.block,
            };
            node.process(&mut ctx);
            for output in outputs.iter_mut() {
                output.computed = self.block;
            }
        }
        self.slots[index] = Some(entry);
        self.stats.nodes_processed += 1;
    }

    fn mix_routes(&self, block: &mut [f32], channels: usize) {
        block.fill(0.0);
        for (channel, routes) in self.routes.iter().enumerate() {
            for source in routes {
                let Some(buffer) = resolve(&self.slots, *source, self.block) else {
                    continue;
                };
                for (frame, sample) in buffer[..self.frames].iter().enumerate() {
                    block[frame * channels + channel] += sample;
                }
            }
        }
    }
}

impl Drop for AudioProcessor {
    fn drop(&mut self) {
        let live = self.slots.iter().flatten().count();
        if live > 0 || !self.parked.is_empty() {
            tracing::debug!(
                live,
                parked = self.parked.len(),
                "audio processor dropped, freeing remaining nodes"
            );
        }
    }
}

impl core::fmt::Debug for AudioProcessor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioProcessor")
            .field("sample_rate", &self.sample_rate)
            .field("block_size", &self.block_size)
            .field("output_channels", &self.routes.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
