//! Property-based tests for strata-nodes.
//!
//! Tests wavetable bounds, filter stability inside a running graph, and
//! buffer playback positions using proptest for randomized input generation.

use proptest::prelude::*;
use strata_core::{AudioObject, EngineConfig, NodeManager};
use strata_nodes::{
    AudioBuffer, BufferPlayer, BufferPlayerNode, Capture, Filter, FilterMode, WaveTable, Waveform,
};

fn waveform(index: usize) -> Waveform {
    [
        Waveform::Sine,
        Waveform::Saw,
        Waveform::Square,
        Waveform::Triangle,
    ][index % 4]
}

fn filter_mode(index: usize) -> FilterMode {
    [
        FilterMode::LowPass,
        FilterMode::HighPass,
        FilterMode::BandPass,
        FilterMode::Notch,
    ][index % 4]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Normalized tables never read outside [-1, 1], wherever the index
    /// lands and whichever band the frequency selects.
    #[test]
    fn wavetable_reads_are_bounded(
        shape in 0usize..4,
        bands in 1usize..9,
        index in -1.0e6f64..1.0e6f64,
        frequency in 0.0f32..30000.0f32,
    ) {
        let table = WaveTable::new(256, waveform(shape), bands);
        let sample = table.interpolate(index, frequency);
        prop_assert!(sample.is_finite());
        prop_assert!(sample.abs() <= 1.0 + 1e-5, "{sample}");
    }

    /// Every filter mode stays finite and bounded for bounded random input
    /// at any cutoff below Nyquist and any resonance in range.
    #[test]
    fn filters_are_stable_in_a_graph(
        mode in 0usize..4,
        frequency in 20.0f32..20000.0f32,
        resonance in 0.0f32..10.0f32,
        input in prop::collection::vec(-1.0f32..=1.0f32, 256),
    ) {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(48000.0, 64, 1));
        let player = BufferPlayer::new(AudioBuffer::new(vec![input], 48000.0))
            .instantiate("input", &manager, &[])
            .unwrap();
        let filter = Filter {
            channel_count: 1,
            mode: filter_mode(mode),
            frequencies: vec![frequency],
            resonances: vec![resonance],
            bands: vec![frequency / 4.0],
            gains: vec![1.0],
        }
        .instantiate("filter", &manager, &[player.as_ref()])
        .unwrap();
        let capture = Capture { channel_count: 1, blocks: 8 }
            .init("tap", &manager, &[filter.as_ref()])
            .unwrap();

        let mut out = vec![0.0f32; 512];
        processor.process(&mut out);
        let captured = capture.drain().remove(0);
        prop_assert_eq!(captured.len(), 512);
        for sample in captured {
            prop_assert!(sample.is_finite());
            prop_assert!(sample.abs() < 100.0, "{sample}");
        }
    }

    /// A player advances exactly `speed` frames per engine frame at matching
    /// rates, until it runs off the end.
    #[test]
    fn player_position_tracks_speed(
        speed in 0.1f32..4.0f32,
        frames in 16usize..512,
    ) {
        let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 16, 1));
        let buffer = AudioBuffer::new(vec![vec![0.5; frames]], 1000.0);
        let (node, control) = BufferPlayerNode::new(buffer, 0);
        let node = manager.register_with(node, control).unwrap();
        manager.route(0, node.output(0)).unwrap();
        node.play(0.0, speed);

        let mut out = [0.0f32; 16];
        processor.process(&mut out);
        let expected = f64::from(speed) * 16.0;
        if node.is_playing() {
            prop_assert!((node.position() - expected).abs() < 1e-3);
            prop_assert!(expected < frames as f64 + 1e-6);
        } else {
            prop_assert!(expected >= frames as f64 - 1e-6);
        }
    }
}
