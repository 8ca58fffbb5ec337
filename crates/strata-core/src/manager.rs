//! Control-thread side of the engine.
//!
//! [`NodeManager`] is a cheaply cloneable handle. It registers nodes, wires
//! pins, chooses which outputs reach the host, and reclaims nodes the audio
//! thread has finished with. It never waits on the audio thread: every change
//! becomes a [`Command`] on a bounded queue, with a control-side backlog when
//! the queue is full.
//!
//! The manager keeps a mirror of the topology so that invalid connections
//! (dead nodes, pins out of range, cycles, nodes of another manager) are
//! rejected synchronously, before anything reaches the audio thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::GraphError;
use crate::node::Node;
use crate::pin::PinSource;
use crate::processor::{AudioProcessor, Command, NodeEntry};
use crate::safe::{InputRef, NodeHandle, OutputRef, SafeOwner, SafePtr};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Engine-wide settings fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Maximum frames per internal block.
    pub block_size: usize,
    /// Host output channel count.
    pub output_channels: usize,
    /// Arena size: the most nodes that can be registered at once.
    pub max_nodes: usize,
    /// Depth of the control → audio command queue.
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 256,
            output_channels: 2,
            max_nodes: 1024,
            command_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Config with the given rate, block size and channel count; capacities
    /// keep their defaults.
    pub fn new(sample_rate: f32, block_size: usize, output_channels: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            output_channels,
            ..Self::default()
        }
    }

    fn sanitized(self) -> Self {
        Self {
            sample_rate: if self.sample_rate > 0.0 {
                self.sample_rate
            } else {
                48000.0
            },
            block_size: self.block_size.max(1),
            output_channels: self.output_channels.max(1),
            max_nodes: self.max_nodes.clamp(1, u32::MAX as usize),
            command_capacity: self.command_capacity.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Live,
    /// Removal sent; waiting for the audio thread to hand the entry back.
    Retiring,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    state: SlotState,
    name: &'static str,
    input_count: u32,
    output_count: u32,
    root: bool,
    inputs: Vec<Option<PinSource>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            generation: 0,
            state: SlotState::Free,
            name: "",
            input_count: 0,
            output_count: 0,
            root: false,
            inputs: Vec::new(),
        }
    }
}

struct Registry {
    commands: Sender<Command>,
    garbage: Receiver<Box<NodeEntry>>,
    backlog: VecDeque<Command>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    routes: Vec<Vec<PinSource>>,
    sample_rate: f32,
    max_nodes: usize,
    live: usize,
    /// The audio processor was dropped; nothing will come back.
    detached: bool,
}

impl Registry {
    /// Flush the backlog and receive returned entries. Entries are handed to
    /// the caller so they are freed after the lock is released.
    fn pump(&mut self, freed: &mut Vec<Box<NodeEntry>>) {
        while let Ok(entry) = self.garbage.try_recv() {
            let index = freed.len();
            freed.push(entry);
            self.reclaim_slot(&freed[index]);
        }
        while let Some(command) = self.backlog.pop_front() {
            match self.commands.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(command)) => {
                    self.backlog.push_front(command);
                    break;
                }
                Err(TrySendError::Disconnected(command)) => {
                    self.detach(command);
                }
            }
        }
    }

    fn reclaim_slot(&mut self, entry: &NodeEntry) {
        let retiring = self.slots.get(entry.index as usize).is_some_and(|slot| {
            slot.state == SlotState::Retiring && slot.generation == entry.generation
        });
        if retiring {
            self.free_slot(entry.index);
        }
    }

    fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if slot.state == SlotState::Free {
            return;
        }
        slot.state = SlotState::Free;
        slot.inputs.clear();
        self.free.push(index);
    }

    fn send(&mut self, command: Command) {
        if self.detached {
            self.detach(command);
            return;
        }
        if !self.backlog.is_empty() {
            self.backlog.push_back(command);
            return;
        }
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                tracing::debug!("command queue full, backlog {}", self.backlog.len() + 1);
                self.backlog.push_back(command);
            }
            Err(TrySendError::Disconnected(command)) => self.detach(command),
        }
    }

    /// Handle a command after the audio processor is gone.
    fn detach(&mut self, command: Command) {
        if !self.detached {
            tracing::debug!("audio processor dropped; freeing nodes on the control thread");
            self.detached = true;
            let retiring: Vec<u32> = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.state == SlotState::Retiring)
                .map(|(index, _)| index as u32)
                .collect();
            for index in retiring {
                self.free_slot(index);
            }
        }
        if let Command::Remove(handle) = command {
            self.free_slot(handle.index);
        }
    }

    fn allocate(&mut self) -> Option<u32> {
        if let Some(index) = self.free.pop() {
            return Some(index);
        }
        if self.slots.len() < self.max_nodes {
            self.slots.push(Slot::empty());
            return Some((self.slots.len() - 1) as u32);
        }
        None
    }

    fn live_slot(&self, handle: NodeHandle) -> Option<&Slot> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.state == SlotState::Live && slot.generation == handle.generation)
    }

    fn check_live(&self, handle: NodeHandle) -> Result<&Slot, GraphError> {
        self.live_slot(handle).ok_or(GraphError::NodeNotFound(handle))
    }

    /// Whether `from` reads, directly or transitively, from `target`.
    fn depends_on(&self, from: NodeHandle, target: NodeHandle) -> bool {
        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![from];
        while let Some(handle) = stack.pop() {
            if handle == target {
                return true;
            }
            let Some(slot) = self.live_slot(handle) else {
                continue;
            };
            if std::mem::replace(&mut visited[handle.index()], true) {
                continue;
            }
            stack.extend(slot.inputs.iter().flatten().map(|source| source.node));
        }
        false
    }
}

struct Shared {
    id: u64,
    block_size: usize,
    output_channels: usize,
    max_nodes: usize,
    registry: Mutex<Registry>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        let returned = registry.garbage.try_iter().count();
        if registry.live > 0 || !registry.backlog.is_empty() {
            tracing::warn!(
                live = registry.live,
                pending = registry.backlog.len(),
                "node manager dropped with nodes still registered; the audio processor frees them when it is dropped"
            );
        }
        tracing::debug!(returned, "node manager dropped");
    }
}

/// Control-thread handle to the engine.
///
/// Cloning is cheap; all clones talk to the same [`AudioProcessor`].
#[derive(Clone)]
pub struct NodeManager {
    shared: Arc<Shared>,
}

impl NodeManager {
    /// Create a manager and the audio processor it drives.
    ///
    /// All arena and queue memory is allocated here, on the calling thread.
    pub fn new(config: EngineConfig) -> (Self, AudioProcessor) {
        let config = config.sanitized();
        let (command_tx, command_rx) = crossbeam_channel::bounded(config.command_capacity);
        let (garbage_tx, garbage_rx) = crossbeam_channel::bounded(config.max_nodes);

        let registry = Registry {
            commands: command_tx,
            garbage: garbage_rx,
            backlog: VecDeque::new(),
            slots: Vec::with_capacity(config.max_nodes),
            free: Vec::new(),
            routes: vec![Vec::new(); config.output_channels],
            sample_rate: config.sample_rate,
            max_nodes: config.max_nodes,
            live: 0,
            detached: false,
        };
        let manager = Self {
            shared: Arc::new(Shared {
                id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
                block_size: config.block_size,
                output_channels: config.output_channels,
                max_nodes: config.max_nodes,
                registry: Mutex::new(registry),
            }),
        };
        let processor = AudioProcessor::new(&config, command_rx, garbage_tx);

        tracing::debug!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            channels = config.output_channels,
            "node manager created"
        );
        (manager, processor)
    }

    /// Lock the registry, pump the queues, run `f`, and free returned nodes
    /// after unlocking.
    fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut freed = Vec::new();
        let result = {
            let mut registry = self.shared.registry.lock();
            registry.pump(&mut freed);
            f(&mut registry)
        };
        drop(freed);
        result
    }

    /// Register a node that has no control surface.
    pub fn register<N: Node + 'static>(&self, node: N) -> Result<SafeOwner, GraphError> {
        self.register_with(node, ())
    }

    /// Register a node together with the control surface it handed out at
    /// construction.
    ///
    /// The node is told the current sample rate, boxed, and queued for
    /// insertion; it becomes visible to the audio thread between two blocks.
    pub fn register_with<N: Node + 'static, C>(
        &self,
        mut node: N,
        control: C,
    ) -> Result<SafeOwner<C>, GraphError> {
        let block_size = self.shared.block_size;
        let max_nodes = self.shared.max_nodes;
        let ptr = self.with_registry(|registry| -> Result<SafePtr, GraphError> {
            node.sample_rate_changed(registry.sample_rate);
            let name = node.name();
            let input_count = node.input_count() as u32;
            let output_count = node.output_count() as u32;

            let index = registry.allocate().ok_or(GraphError::CapacityExceeded {
                what: "node arena",
                capacity: max_nodes,
            })?;
            let slot = &mut registry.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.state = SlotState::Live;
            slot.name = name;
            slot.input_count = input_count;
            slot.output_count = output_count;
            slot.root = false;
            slot.inputs = vec![None; input_count as usize];
            let handle = NodeHandle::new(index, slot.generation);

            let entry = Box::new(NodeEntry::new(handle, Box::new(node), block_size));
            registry.send(Command::Insert { index, entry });
            registry.live += 1;
            tracing::debug!("graph_register: {name} {handle}");

            Ok(SafePtr {
                handle,
                manager: self.shared.id,
                inputs: input_count,
                outputs: output_count,
            })
        })?;
        Ok(SafeOwner::new(ptr, self.clone(), control))
    }

    /// Release a node. Same as dropping its owner.
    pub fn unregister<C>(&self, owner: SafeOwner<C>) {
        drop(owner);
    }

    /// Queue removal of `handle`; called from [`SafeOwner`]'s `Drop`.
    pub(crate) fn retire(&self, handle: NodeHandle) {
        self.with_registry(|registry| {
            let Some(slot) = registry.slots.get_mut(handle.index()) else {
                return;
            };
            if slot.state != SlotState::Live || slot.generation != handle.generation {
                return;
            }
            slot.state = SlotState::Retiring;
            slot.root = false;
            slot.inputs.clear();
            let name = slot.name;
            for routes in &mut registry.routes {
                routes.retain(|source| source.node != handle);
            }
            registry.live -= 1;
            registry.send(Command::Remove(handle));
            tracing::debug!("graph_unregister: {name} {handle}");
        });
    }

    fn check_manager(&self, ptr: &SafePtr) -> Result<(), GraphError> {
        if ptr.manager == self.shared.id {
            Ok(())
        } else {
            Err(GraphError::ManagerMismatch(ptr.handle))
        }
    }

    /// Connect `source` to `dest`, replacing any previous connection of that
    /// input.
    ///
    /// Rejects released nodes, pins out of range, nodes registered with
    /// another manager, and edges that would close a cycle. Takes effect
    /// between blocks.
    pub fn connect(&self, source: OutputRef, dest: InputRef) -> Result<(), GraphError> {
        self.check_manager(&source.node)?;
        self.check_manager(&dest.node)?;
        let from = source.node.handle;
        let to = dest.node.handle;

        self.with_registry(|registry| -> Result<(), GraphError> {
            let source_slot = registry.check_live(from)?;
            if source.pin >= source_slot.output_count as usize {
                return Err(GraphError::PinOutOfRange {
                    node: from,
                    kind: "output",
                    index: source.pin,
                    count: source_slot.output_count as usize,
                });
            }
            let dest_slot = registry.check_live(to)?;
            if dest.pin >= dest_slot.input_count as usize {
                return Err(GraphError::PinOutOfRange {
                    node: to,
                    kind: "input",
                    index: dest.pin,
                    count: dest_slot.input_count as usize,
                });
            }
            if registry.depends_on(from, to) {
                return Err(GraphError::CycleDetected { from, to });
            }

            let pin_source = PinSource {
                node: from,
                pin: source.pin as u32,
            };
            registry.slots[to.index()].inputs[dest.pin] = Some(pin_source);
            registry.send(Command::Connect {
                node: to,
                pin: dest.pin as u32,
                source: Some(pin_source),
            });
            tracing::debug!(
                "graph_connect: {from}:{} → {to}:{}",
                source.pin,
                dest.pin
            );
            Ok(())
        })
    }

    /// Disconnect input `dest`. Disconnecting an unconnected input is a no-op.
    pub fn disconnect(&self, dest: InputRef) -> Result<(), GraphError> {
        self.check_manager(&dest.node)?;
        let to = dest.node.handle;
        self.with_registry(|registry| -> Result<(), GraphError> {
            let slot = registry.check_live(to)?;
            if dest.pin >= slot.input_count as usize {
                return Err(GraphError::PinOutOfRange {
                    node: to,
                    kind: "input",
                    index: dest.pin,
                    count: slot.input_count as usize,
                });
            }
            if registry.slots[to.index()].inputs[dest.pin].take().is_some() {
                registry.send(Command::Connect {
                    node: to,
                    pin: dest.pin as u32,
                    source: None,
                });
                tracing::debug!("graph_disconnect: {to}:{}", dest.pin);
            }
            Ok(())
        })
    }

    /// Whether input `dest` is connected to a live source.
    pub fn is_connected(&self, dest: InputRef) -> bool {
        self.with_registry(|registry| {
            registry
                .live_slot(dest.node.handle)
                .and_then(|slot| slot.inputs.get(dest.pin).copied().flatten())
                .is_some_and(|source| registry.live_slot(source.node).is_some())
        })
    }

    /// Sum `source` into host output `channel`. The node becomes a root and is
    /// pulled every block.
    pub fn route(&self, channel: usize, source: OutputRef) -> Result<(), GraphError> {
        self.check_manager(&source.node)?;
        let count = self.shared.output_channels;
        if channel >= count {
            return Err(GraphError::ChannelOutOfRange { channel, count });
        }
        let capacity = self.shared.max_nodes;
        let from = source.node.handle;
        self.with_registry(|registry| -> Result<(), GraphError> {
            let slot = registry.check_live(from)?;
            if source.pin >= slot.output_count as usize {
                return Err(GraphError::PinOutOfRange {
                    node: from,
                    kind: "output",
                    index: source.pin,
                    count: slot.output_count as usize,
                });
            }
            if registry.routes[channel].len() >= capacity {
                return Err(GraphError::CapacityExceeded {
                    what: "output routes",
                    capacity,
                });
            }
            let pin_source = PinSource {
                node: from,
                pin: source.pin as u32,
            };
            registry.routes[channel].push(pin_source);
            registry.send(Command::Route {
                channel: channel as u32,
                source: pin_source,
            });
            tracing::debug!("graph_route: {from}:{} → out {channel}", source.pin);
            Ok(())
        })
    }

    /// Remove one route of `source` from host output `channel`.
    pub fn unroute(&self, channel: usize, source: OutputRef) -> Result<(), GraphError> {
        self.check_manager(&source.node)?;
        let count = self.shared.output_channels;
        if channel >= count {
            return Err(GraphError::ChannelOutOfRange { channel, count });
        }
        let pin_source = PinSource {
            node: source.node.handle,
            pin: source.pin as u32,
        };
        self.with_registry(|registry| -> Result<(), GraphError> {
            let routes = &mut registry.routes[channel];
            if let Some(position) = routes.iter().position(|s| *s == pin_source) {
                routes.swap_remove(position);
                registry.send(Command::Unroute {
                    channel: channel as u32,
                    source: pin_source,
                });
            }
            Ok(())
        })
    }

    /// Pull `node` every block even if nothing downstream reads it. Used for
    /// sinks (recorders) and for generators that must keep running.
    pub fn add_root(&self, node: &SafePtr) -> Result<(), GraphError> {
        self.check_manager(node)?;
        self.with_registry(|registry| -> Result<(), GraphError> {
            registry.check_live(node.handle)?;
            let slot = &mut registry.slots[node.handle.index()];
            if !slot.root {
                slot.root = true;
                registry.send(Command::AddRoot(node.handle));
            }
            Ok(())
        })
    }

    /// Stop pulling `node` unconditionally.
    pub fn remove_root(&self, node: &SafePtr) -> Result<(), GraphError> {
        self.check_manager(node)?;
        self.with_registry(|registry| -> Result<(), GraphError> {
            registry.check_live(node.handle)?;
            let slot = &mut registry.slots[node.handle.index()];
            if slot.root {
                slot.root = false;
                registry.send(Command::RemoveRoot(node.handle));
            }
            Ok(())
        })
    }

    /// Change the engine sample rate. Every live node is notified between
    /// blocks; nodes registered afterwards are told the new rate on
    /// registration.
    pub fn set_sample_rate(&self, sample_rate: f32) {
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            tracing::warn!("ignoring invalid sample rate {sample_rate}");
            return;
        }
        self.with_registry(|registry| {
            registry.sample_rate = sample_rate;
            registry.send(Command::SetSampleRate(sample_rate));
        });
        tracing::debug!("sample rate changed to {sample_rate}");
    }

    /// Current engine sample rate as seen by the control thread.
    pub fn sample_rate(&self) -> f32 {
        self.with_registry(|registry| registry.sample_rate)
    }

    /// Maximum frames per block.
    pub fn block_size(&self) -> usize {
        self.shared.block_size
    }

    /// Host output channel count.
    pub fn output_channels(&self) -> usize {
        self.shared.output_channels
    }

    /// Whether `ptr` still names a registered node of this manager.
    pub fn is_alive(&self, ptr: &SafePtr) -> bool {
        ptr.manager == self.shared.id
            && self.with_registry(|registry| registry.live_slot(ptr.handle).is_some())
    }

    /// Nodes registered and not yet released.
    pub fn live_node_count(&self) -> usize {
        self.with_registry(|registry| registry.live)
    }

    /// Released nodes whose memory has not come back from the audio thread.
    pub fn pending_deletions(&self) -> usize {
        self.with_registry(|registry| {
            registry
                .slots
                .iter()
                .filter(|slot| slot.state == SlotState::Retiring)
                .count()
        })
    }

    /// Free nodes returned by the audio thread and flush queued commands.
    /// Every other manager call does this too.
    pub fn collect_garbage(&self) {
        self.with_registry(|_| ());
    }

    /// Whether two handles refer to the same engine.
    pub fn same_engine(&self, other: &NodeManager) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl core::fmt::Debug for NodeManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeManager")
            .field("id", &self.shared.id)
            .field("block_size", &self.shared.block_size)
            .field("output_channels", &self.shared.output_channels)
            .finish_non_exhaustive()
    }
}
