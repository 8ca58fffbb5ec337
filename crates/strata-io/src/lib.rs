//! Audio I/O for the strata audio graph.
//!
//! This crate provides:
//!
//! - **Live output**: [`AudioOutput`] moves an [`AudioProcessor`](strata_core::AudioProcessor)
//!   into a cpal output callback
//! - **Offline rendering**: [`render_offline`] and [`render_interleaved`] pull
//!   blocks in a plain loop, faster than real time
//! - **WAV file I/O**: [`read_wav`] and [`write_wav`] for loading and saving
//!   multichannel audio
//! - **Recording**: [`WavRecorder`] streams a [`Capture`](strata_nodes::Capture)
//!   into a WAV file
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata_core::{EngineConfig, NodeManager};
//! use strata_io::{render_offline, write_buffer};
//!
//! let (manager, mut processor) = NodeManager::new(EngineConfig::new(48000.0, 256, 2));
//! // ... build and route a graph with `manager` ...
//!
//! let rendered = render_offline(&mut processor, 48000);
//! write_buffer("out.wav", &rendered, 24)?;
//! ```

mod recorder;
mod render;
mod stream;
mod wav;

pub use recorder::WavRecorder;
pub use render::{render_interleaved, render_offline};
pub use stream::{
    AudioDevice, AudioOutput, StreamConfig, default_output_device, list_output_devices,
};
pub use wav::{WavFormat, WavInfo, WavSpec, read_wav, read_wav_info, write_buffer, write_wav};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested sample format is not supported.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Channel layout of the data does not match the file or stream.
    #[error("Channel mismatch: expected {expected}, got {found}")]
    ChannelMismatch {
        /// Channels the destination was opened with.
        expected: usize,
        /// Channels supplied.
        found: usize,
    },

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
