//! Cross-thread ownership of registered nodes.
//!
//! A node lives in the audio thread's arena once registered. The control
//! thread never holds a pointer to it; it holds a [`SafeOwner`], which owns
//! the registration, and any number of [`SafePtr`]s, which only name the slot.
//!
//! Dropping the owner queues the node for deletion. The audio thread detaches
//! it between two blocks and sends the box back; the control thread frees it
//! the next time it touches the manager. Slot indices are recycled only after
//! that return trip, and each reuse bumps the slot generation, so a stale
//! `SafePtr` is detected instead of aliasing a newer node.

use core::fmt;
use core::ops::Deref;

use crate::manager::NodeManager;

/// Generational index of a node slot in the engine arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Slot generation this handle was issued for.
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Non-owning, copyable reference to a registered node.
///
/// Valid for connections while the owning [`SafeOwner`] is alive. Afterwards
/// it is invalid rather than dangling: the manager rejects it and the audio
/// thread reads silence from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SafePtr {
    pub(crate) handle: NodeHandle,
    pub(crate) manager: u64,
    pub(crate) inputs: u32,
    pub(crate) outputs: u32,
}

impl SafePtr {
    /// Arena handle.
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// Number of input pins on the node.
    pub fn input_count(&self) -> usize {
        self.inputs as usize
    }

    /// Number of output pins on the node.
    pub fn output_count(&self) -> usize {
        self.outputs as usize
    }

    /// Reference to output pin `pin`. Range is checked when connecting.
    pub fn output(&self, pin: usize) -> OutputRef {
        OutputRef { node: *self, pin }
    }

    /// Reference to input pin `pin`. Range is checked when connecting.
    pub fn input(&self, pin: usize) -> InputRef {
        InputRef { node: *self, pin }
    }
}

/// An output pin of a registered node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputRef {
    /// Node owning the pin.
    pub node: SafePtr,
    /// Output pin index.
    pub pin: usize,
}

/// An input pin of a registered node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputRef {
    /// Node owning the pin.
    pub node: SafePtr,
    /// Input pin index.
    pub pin: usize,
}

/// Control-thread owner of one registered node and its control surface.
///
/// `C` is whatever the node hands back to the control thread at construction:
/// smoothing handles, message senders, or `()` for nodes without parameters.
/// The owner dereferences to `C`.
pub struct SafeOwner<C = ()> {
    ptr: SafePtr,
    manager: NodeManager,
    control: C,
}

impl<C> SafeOwner<C> {
    pub(crate) fn new(ptr: SafePtr, manager: NodeManager, control: C) -> Self {
        Self {
            ptr,
            manager,
            control,
        }
    }

    /// Non-owning reference to the node.
    pub fn ptr(&self) -> SafePtr {
        self.ptr
    }

    /// Arena handle of the node.
    pub fn handle(&self) -> NodeHandle {
        self.ptr.handle
    }

    /// Output pin `pin` of the node.
    pub fn output(&self, pin: usize) -> OutputRef {
        self.ptr.output(pin)
    }

    /// Input pin `pin` of the node.
    pub fn input(&self, pin: usize) -> InputRef {
        self.ptr.input(pin)
    }

    /// Control surface of the node.
    pub fn control(&self) -> &C {
        &self.control
    }

    /// Manager the node is registered with.
    pub fn manager(&self) -> &NodeManager {
        &self.manager
    }
}

impl<C> Deref for SafeOwner<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.control
    }
}

impl<C> Drop for SafeOwner<C> {
    fn drop(&mut self) {
        self.manager.retire(self.ptr.handle);
    }
}

impl<C> fmt::Debug for SafeOwner<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeOwner")
            .field("handle", &self.ptr.handle)
            .field("inputs", &self.ptr.inputs)
            .field("outputs", &self.ptr.outputs)
            .finish_non_exhaustive()
    }
}
