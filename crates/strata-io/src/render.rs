//! Offline rendering: drive the processor from a plain loop.

use strata_core::AudioProcessor;
use strata_nodes::AudioBuffer;

/// Render `frames` frames into an interleaved vector.
///
/// Blocks are pulled one engine block at a time and `progress` is called with
/// the number of frames rendered so far after each one.
pub fn render_interleaved(
    processor: &mut AudioProcessor,
    frames: usize,
    mut progress: impl FnMut(usize),
) -> Vec<f32> {
    let channels = processor.output_channels();
    let block = processor.block_size().max(1);
    let mut out = vec![0.0f32; frames * channels];

    let mut done = 0;
    for chunk in out.chunks_mut(block * channels) {
        processor.process(chunk);
        done += chunk.len() / channels;
        progress(done);
    }
    tracing::debug!(frames, channels, "offline render finished");
    out
}

/// Render `frames` frames into a buffer at the processor's sample rate.
pub fn render_offline(processor: &mut AudioProcessor, frames: usize) -> AudioBuffer {
    let channels = processor.output_channels();
    let interleaved = render_interleaved(processor, frames, |_| {});
    AudioBuffer::from_interleaved(&interleaved, channels, processor.sample_rate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{AudioObject, AudioObjectInstance, EngineConfig, NodeManager};
    use strata_nodes::Constant;

    #[test]
    fn progress_is_reported_per_block() {
        let (_manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 1));
        let mut reports = Vec::new();
        let out = render_interleaved(&mut processor, 10, |done| reports.push(done));
        assert_eq!(out.len(), 10);
        assert_eq!(reports, vec![4, 8, 10]);
    }

    #[test]
    fn rendered_buffer_is_split_by_channel() {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 4, 2));
        let dc = Constant {
            channel_count: 2,
            values: vec![0.25, -0.5],
        }
        .instantiate("dc", &manager, &[])
        .unwrap();
        for channel in 0..2 {
            manager
                .route(channel, dc.output_for_channel(channel).unwrap())
                .unwrap();
        }

        let buffer = render_offline(&mut processor, 6);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.sample_rate(), 1000.0);
        assert_eq!(buffer.channel(0).unwrap(), &[0.25; 6]);
        assert_eq!(buffer.channel(1).unwrap(), &[-0.5; 6]);
    }
}
