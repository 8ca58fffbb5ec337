//! Integration tests for strata-io WAV I/O, offline rendering and recording.

use strata_core::{AudioObject, AudioObjectInstance, EngineConfig, NodeManager};
use strata_io::{
    WavFormat, WavRecorder, WavSpec, read_wav, read_wav_info, render_interleaved, render_offline,
    write_buffer, write_wav,
};
use strata_nodes::{AudioBuffer, BufferPlayer, Capture, Gain, Oscillator, Waveform};
use tempfile::NamedTempFile;

/// Generate a sine wave at the given sample rate.
fn sine_wave(sample_rate: u32, freq_hz: f32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| (2.0 * std::f32::consts::PI * freq_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

fn route_all(manager: &NodeManager, object: &dyn AudioObjectInstance) {
    for channel in 0..object.channel_count() {
        manager
            .route(channel, object.output_for_channel(channel).unwrap())
            .unwrap();
    }
}

// ---------------------------------------------------------------------------
// WAV round trips
// ---------------------------------------------------------------------------

#[test]
fn wav_roundtrip_mono_f32_96000() {
    let sr = 96000;
    let samples = sine_wave(sr, 1000.0, sr as usize);
    let spec = WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 32,
    };

    let file = NamedTempFile::new().unwrap();
    write_wav(file.path(), &samples, spec).unwrap();

    let (loaded, loaded_spec) = read_wav(file.path()).unwrap();
    assert_eq!(loaded_spec.sample_rate, sr);
    assert_eq!(loaded.frames(), samples.len());
    for (a, b) in samples.iter().zip(loaded.channel(0).unwrap()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn wav_roundtrip_stereo_i24() {
    let left = sine_wave(44100, 440.0, 4410);
    let right: Vec<f32> = left.iter().map(|s| -0.5 * s).collect();
    let buffer = AudioBuffer::new(vec![left, right], 44100.0);

    let file = NamedTempFile::new().unwrap();
    write_buffer(file.path(), &buffer, 24).unwrap();

    let info = read_wav_info(file.path()).unwrap();
    assert_eq!(info.channels, 2);
    assert_eq!(info.bits_per_sample, 24);
    assert_eq!(info.num_frames, 4410);
    assert_eq!(info.format, WavFormat::Pcm);
    assert!((info.duration_secs - 0.1).abs() < 1e-9);

    let (loaded, _) = read_wav(file.path()).unwrap();
    for channel in 0..2 {
        for (a, b) in buffer
            .channel(channel)
            .unwrap()
            .iter()
            .zip(loaded.channel(channel).unwrap())
        {
            assert!((a - b).abs() < 1e-5, "channel {channel}: {a} vs {b}");
        }
    }
}

// ---------------------------------------------------------------------------
// Offline rendering
// ---------------------------------------------------------------------------

fn render_patch(frames: usize) -> Vec<f32> {
    let (manager, mut processor) = NodeManager::new(EngineConfig::new(48000.0, 128, 2));
    let mut osc = Oscillator::new(Waveform::Saw);
    osc.channel_count = 2;
    osc.frequencies = vec![220.0, 330.0];
    let osc = osc.instantiate("osc", &manager, &[]).unwrap();
    let gain = Gain {
        channel_count: 2,
        gains: vec![0.5],
    }
    .instantiate("gain", &manager, &[osc.as_ref()])
    .unwrap();
    route_all(&manager, gain.as_ref());
    render_interleaved(&mut processor, frames, |_| {})
}

#[test]
fn offline_render_is_deterministic() {
    let a = render_patch(4800);
    let b = render_patch(4800);
    assert_eq!(a.len(), 9600);
    assert_eq!(a, b);
    assert!(a.iter().any(|s| s.abs() > 0.1));
    assert!(a.iter().all(|s| s.abs() <= 0.5 + 1e-5));
}

#[test]
fn rendered_patch_survives_a_wav_roundtrip() {
    let (manager, mut processor) = NodeManager::new(EngineConfig::new(8000.0, 64, 1));
    let osc = Oscillator::new(Waveform::Sine)
        .instantiate("osc", &manager, &[])
        .unwrap();
    route_all(&manager, osc.as_ref());

    let rendered = render_offline(&mut processor, 800);
    let file = NamedTempFile::new().unwrap();
    write_buffer(file.path(), &rendered, 32).unwrap();

    let (loaded, spec) = read_wav(file.path()).unwrap();
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(loaded, rendered);
}

#[test]
fn wav_file_plays_back_through_a_buffer_player() {
    let samples: Vec<f32> = (0..64).map(|i| i as f32 / 64.0).collect();
    let file = NamedTempFile::new().unwrap();
    write_wav(
        file.path(),
        &samples,
        WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 32,
        },
    )
    .unwrap();
    let (buffer, _) = read_wav(file.path()).unwrap();

    let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 16, 1));
    let player = BufferPlayer::new(buffer)
        .instantiate("player", &manager, &[])
        .unwrap();
    route_all(&manager, player.as_ref());

    let rendered = render_offline(&mut processor, 80);
    let channel = rendered.channel(0).unwrap();
    assert_eq!(&channel[..64], samples.as_slice());
    assert!(channel[64..].iter().all(|&s| s == 0.0));
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

#[test]
fn capture_records_to_wav() {
    let (manager, mut processor) = NodeManager::new(EngineConfig::new(1000.0, 8, 2));
    let mut osc = Oscillator::new(Waveform::Square);
    osc.channel_count = 2;
    osc.frequencies = vec![125.0];
    let osc = osc.instantiate("osc", &manager, &[]).unwrap();
    route_all(&manager, osc.as_ref());
    let capture = Capture {
        channel_count: 2,
        blocks: 16,
    }
    .init("tap", &manager, &[osc.as_ref()])
    .unwrap();

    let file = NamedTempFile::new().unwrap();
    let mut recorder = WavRecorder::create(
        file.path(),
        WavSpec {
            channels: 2,
            sample_rate: 1000,
            bits_per_sample: 32,
        },
    )
    .unwrap();

    let mut host = Vec::new();
    for _ in 0..4 {
        host.extend(render_interleaved(&mut processor, 32, |_| {}));
        recorder.record(&capture).unwrap();
    }
    assert_eq!(recorder.finalize().unwrap(), 128);
    assert_eq!(capture.dropped_blocks(), 0);

    let (recorded, _) = read_wav(file.path()).unwrap();
    assert_eq!(recorded.to_interleaved(), host);
}
