//! Strata Core - real-time audio graph engine
//!
//! A graph of processing nodes evaluated block by block on the audio thread,
//! edited and owned from a control thread without locks on the audio path.
//!
//! # Core Abstractions
//!
//! ## Graph
//!
//! - [`Node`] - Unit of processing with fixed input and output pins
//! - [`NodeManager`] - Control-thread handle: register, connect, route, delete
//! - [`AudioProcessor`] - Audio-thread half: owns the nodes, renders blocks
//! - [`SafeOwner`] / [`SafePtr`] - Owning and non-owning node references
//!
//! Evaluation is pull-based. Each block starts from the routed outputs and
//! root nodes and recursively pulls inputs; a node computes at most once per
//! block no matter how many consumers read it.
//!
//! ## Parameter Smoothing
//!
//! - [`LinearSmoothedValue`] - Ramp over a number of samples
//! - [`RampedValue`] - Ramp over milliseconds, linear or exponential
//!
//! Both hand out `Send` handles so targets can be set from any thread.
//!
//! ## Objects
//!
//! - [`MultiChannelObject`] / [`MultiChannelObjectInstance`] - One mono node per channel
//! - [`ParallelNodeObject`] - Closure-backed multichannel object
//! - [`PolyphonicObjectInstance`] - Voice pool with stealing and release tracking
//! - [`AudioObject`] - Named, instantiable object descriptions
//!
//! # Example
//!
//! ```rust
//! use strata_core::{EngineConfig, MixNode, NodeManager};
//!
//! let (manager, mut processor) = NodeManager::new(EngineConfig::new(48_000.0, 64, 2));
//! let mix = manager.register(MixNode::new(4)).unwrap();
//! manager.route(0, mix.output(0)).unwrap();
//!
//! // Audio thread
//! let mut buffer = vec![0.0f32; 64 * 2];
//! processor.process(&mut buffer);
//! assert!(buffer.iter().all(|&s| s == 0.0));
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: No allocation, locking or freeing on the audio thread
//! - **Deferred deletion**: Nodes die on the control thread, never mid-block
//! - **Stale-safe handles**: Generational indices instead of raw pointers

pub mod envelope;
pub mod error;
pub mod manager;
pub mod math;
pub mod mix;
pub mod multichannel;
pub mod node;
pub mod object;
mod pin;
pub mod polyphonic;
pub mod processor;
pub mod safe;
pub mod smoothing;

// Re-export main types at crate root
pub use envelope::{
    CompletionNotifier, ENVELOPE_QUEUE_DEPTH, EnvelopeCompletion, EnvelopeControl, EnvelopeMessage,
    EnvelopeNode, EnvelopeShape, EnvelopeStage,
};
pub use error::{GraphError, ObjectError};
pub use manager::{EngineConfig, NodeManager};
pub use math::{db_to_linear, flush_denormal, linear_to_db, midi_to_hz};
pub use mix::MixNode;
pub use multichannel::{
    MAX_CHANNELS, MultiChannelObject, MultiChannelObjectInstance, ParallelNodeObject,
};
pub use node::{Node, ProcessContext};
pub use object::{AudioObject, AudioObjectInstance, ObjectInputs};
pub use polyphonic::{
    PolyphonicObject, PolyphonicObjectInstance, Voice, VoiceContext, VoiceFactory, VoiceGraph,
    VoiceId, VoiceState,
};
pub use processor::{AudioProcessor, ProcessorStats};
pub use safe::{InputRef, NodeHandle, OutputRef, SafeOwner, SafePtr};
pub use smoothing::{
    LinearSmoothedValue, RampMode, RampedValue, RampedValueHandle, SmoothedValueHandle,
    ms_to_samples,
};
