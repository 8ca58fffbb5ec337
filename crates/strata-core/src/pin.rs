//! Audio-side pin storage.
//!
//! Pins are plain data owned by the node's arena entry. The control thread
//! never touches them; it sends connect/disconnect commands which the audio
//! thread applies between blocks.

use crate::safe::NodeHandle;

/// Output `pin` of the node in slot `node`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PinSource {
    pub node: NodeHandle,
    pub pin: u32,
}

/// One block of samples plus the block stamp it was last computed in.
///
/// The stamp is the "computed this block" flag: consumers pulled later in the
/// same block see a current stamp and reuse the buffer.
#[derive(Debug)]
pub(crate) struct OutputPin {
    pub buffer: Vec<f32>,
    pub computed: u64,
}

impl OutputPin {
    pub fn new(block_size: usize) -> Self {
        Self {
            buffer: vec![0.0; block_size],
            computed: 0,
        }
    }

    #[inline]
    pub fn is_current(&self, block: u64) -> bool {
        self.computed == block
    }
}

/// Reference to at most one upstream output. `None` reads as silence.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct InputPin {
    pub source: Option<PinSource>,
}
