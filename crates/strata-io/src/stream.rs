//! Real-time audio output via cpal.
//!
//! [`AudioOutput::start`] moves an [`AudioProcessor`] into the cpal output
//! callback. The callback never allocates: when the device channel count
//! differs from the engine's, blocks are rendered into a scratch buffer
//! sized at start-up and remapped frame by frame.

use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strata_core::AudioProcessor;

/// Extract device name via `description()` (cpal 0.17+).
pub(crate) fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Output device as listed by [`list_output_devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Position in the host's output device list, usable with `--device`.
    pub index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Default channel count.
    pub default_channels: u16,
}

impl AudioDevice {
    fn describe(index: usize, device: &Device) -> Option<Self> {
        let name = device_name(device).ok()?;
        let (default_sample_rate, default_channels) = device
            .default_output_config()
            .map(|c| (c.sample_rate(), c.channels()))
            .unwrap_or((48000, 2));
        Some(Self {
            index,
            name,
            default_sample_rate,
            default_channels,
        })
    }
}

/// Output stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Sample rate in Hz. Should match the engine's.
    pub sample_rate: u32,
    /// Buffer size in frames.
    pub buffer_size: u32,
    /// Output device name or index (uses default if `None`).
    pub output_device: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 256,
            output_device: None,
        }
    }
}

/// List the host's output devices in enumeration order.
pub fn list_output_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?;
    Ok(devices
        .enumerate()
        .filter_map(|(index, device)| AudioDevice::describe(index, &device))
        .collect())
}

/// The host's default output device, if it has one.
pub fn default_output_device() -> Result<Option<AudioDevice>> {
    let host = cpal::default_host();
    let Some(default) = host.default_output_device() else {
        return Ok(None);
    };
    let default_name = device_name(&default).ok();
    let listed = list_output_devices()?
        .into_iter()
        .find(|d| Some(&d.name) == default_name.as_ref());
    Ok(listed.or_else(|| AudioDevice::describe(0, &default)))
}

/// Maps the engine's interleaved channel layout onto the device's.
///
/// A mono engine feeds every device channel; otherwise device channel `d`
/// takes engine channel `d` and channels the engine lacks are silent.
pub(crate) struct ChannelAdapter {
    engine_channels: usize,
    device_channels: usize,
    scratch: Vec<f32>,
}

impl ChannelAdapter {
    pub(crate) fn new(engine_channels: usize, device_channels: usize, max_frames: usize) -> Self {
        let engine_channels = engine_channels.max(1);
        let device_channels = device_channels.max(1);
        let scratch = if engine_channels == device_channels {
            Vec::new()
        } else {
            vec![0.0; max_frames.max(1) * engine_channels]
        };
        Self {
            engine_channels,
            device_channels,
            scratch,
        }
    }

    pub(crate) fn render(&mut self, processor: &mut AudioProcessor, data: &mut [f32]) {
        if self.engine_channels == self.device_channels {
            processor.process(data);
            return;
        }

        let chunk_frames = self.scratch.len() / self.engine_channels;
        for out_chunk in data.chunks_mut(chunk_frames * self.device_channels) {
            let frames = out_chunk.len() / self.device_channels;
            let scratch = &mut self.scratch[..frames * self.engine_channels];
            processor.process(scratch);

            for (out_frame, in_frame) in out_chunk
                .chunks_mut(self.device_channels)
                .zip(scratch.chunks(self.engine_channels))
            {
                for (channel, sample) in out_frame.iter_mut().enumerate() {
                    *sample = if self.engine_channels == 1 {
                        in_frame[0]
                    } else {
                        in_frame.get(channel).copied().unwrap_or(0.0)
                    };
                }
            }
        }
    }
}

/// Live output stream driving an [`AudioProcessor`].
///
/// Audio stops when the value is dropped.
pub struct AudioOutput {
    _stream: Stream,
    running: Arc<AtomicBool>,
    device_name: String,
    channels: u16,
    sample_rate: u32,
}

impl AudioOutput {
    /// Open the configured output device and start rendering.
    ///
    /// The stream runs at `config.sample_rate` with the device's default
    /// channel count.
    pub fn start(mut processor: AudioProcessor, config: &StreamConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = match &config.output_device {
            Some(name) => find_output_device(&host, name)?,
            None => host.default_output_device().ok_or(Error::NoDevice)?,
        };
        let name = device_name(&device).unwrap_or_else(|_| "unknown".to_string());
        let channels = device
            .default_output_config()
            .map(|c| c.channels())
            .unwrap_or(2);

        if (processor.sample_rate() - config.sample_rate as f32).abs() > 0.5 {
            tracing::warn!(
                engine = processor.sample_rate(),
                stream = config.sample_rate,
                "engine and stream sample rates differ"
            );
        }

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let mut adapter = ChannelAdapter::new(
            processor.output_channels(),
            usize::from(channels),
            config.buffer_size as usize,
        );
        let running = Arc::new(AtomicBool::new(true));
        let callback_running = Arc::clone(&running);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if callback_running.load(Ordering::Acquire) {
                        adapter.render(&mut processor, data);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| tracing::error!("output stream error: {err}"),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;
        stream.play().map_err(|e| Error::Stream(e.to_string()))?;

        tracing::info!(
            device = %name,
            channels,
            sample_rate = config.sample_rate,
            "output stream started"
        );

        Ok(Self {
            _stream: stream,
            running,
            device_name: name,
            channels,
            sample_rate: config.sample_rate,
        })
    }

    /// Silence the output. The stream stays open until dropped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Check if the stream is rendering.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared running flag, e.g. for a Ctrl-C handler.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Block until the stream is stopped.
    pub fn wait(&self) {
        while self.is_running() {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    /// Name of the output device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Device channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stream sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Find an output device by index, exact name, or case-insensitive partial
/// name. Several partial matches pick the first and log the rest.
fn find_output_device(host: &Host, name_or_index: &str) -> Result<Device> {
    let devices: Vec<_> = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?
        .collect();

    if let Ok(index) = name_or_index.parse::<usize>() {
        return devices.get(index).cloned().ok_or_else(|| {
            Error::DeviceNotFound(format!(
                "output device index {index} (only {} available)",
                devices.len()
            ))
        });
    }

    let named: Vec<_> = devices
        .iter()
        .filter_map(|d| device_name(d).ok().map(|name| (d, name)))
        .collect();
    if let Some((device, _)) = named.iter().find(|(_, name)| name == name_or_index) {
        return Ok((*device).clone());
    }

    let search = name_or_index.to_lowercase();
    let matches: Vec<_> = named
        .iter()
        .filter(|(_, name)| name.to_lowercase().contains(&search))
        .collect();
    match matches.as_slice() {
        [] => Err(Error::DeviceNotFound(format!(
            "no output device matching '{name_or_index}'"
        ))),
        [(device, _)] => Ok((*device).clone()),
        [(device, first), ..] => {
            let names: Vec<_> = matches.iter().map(|(_, n)| n.as_str()).collect();
            tracing::warn!("'{name_or_index}' matches {names:?}, using {first}");
            Ok((*device).clone())
        }
    }
}
