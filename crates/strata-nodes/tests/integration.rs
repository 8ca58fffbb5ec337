//! Integration tests for strata-nodes.
//!
//! Tests cover object chains across crates, polyphonic voices built from
//! library nodes, buffer playback into captures, live parameter changes, and
//! crossfaded looping.

use std::sync::Arc;

use strata_core::{
    AudioObject, AudioObjectInstance, EngineConfig, EnvelopeShape, NodeManager, ObjectError,
    PolyphonicObject, PolyphonicObjectInstance, VoiceContext, VoiceGraph, VoiceState, midi_to_hz,
};
use strata_nodes::{
    AudioBuffer, BufferLooper, BufferLooperInstance, BufferPlayer, Capture, Constant, Filter, FilterMode, Gain, GainNode,
    Oscillator, OscillatorControl, OscillatorNode, WaveTable, Waveform,
};

fn engine(block: usize, channels: usize) -> (NodeManager, strata_core::AudioProcessor) {
    NodeManager::new(EngineConfig::new(1000.0, block, channels))
}

fn route_all(manager: &NodeManager, object: &dyn AudioObjectInstance) {
    for channel in 0..object.channel_count() {
        manager
            .route(channel, object.output_for_channel(channel).unwrap())
            .unwrap();
    }
}

// ---------------------------------------------------------------------------
// 1. Object chains
// ---------------------------------------------------------------------------

#[test]
fn two_channel_gain_scales_a_constant_per_channel() {
    let (manager, mut processor) = engine(4, 2);
    let ones = Constant {
        channel_count: 2,
        values: vec![1.0],
    }
    .instantiate("ones", &manager, &[])
    .unwrap();
    let gain = Gain {
        channel_count: 2,
        gains: vec![0.5, 0.8],
    }
    .instantiate("gain", &manager, &[ones.as_ref()])
    .unwrap();
    route_all(&manager, gain.as_ref());

    let mut out = [0.0f32; 8];
    processor.process(&mut out);
    for frame in out.chunks(2) {
        assert_eq!(frame[0], 0.5);
        assert_eq!(frame[1], 0.8);
    }
}

#[test]
fn mono_source_feeds_every_channel_of_a_wider_object() {
    let (manager, mut processor) = engine(4, 3);
    let dc = Constant {
        channel_count: 1,
        values: vec![0.5],
    }
    .instantiate("dc", &manager, &[])
    .unwrap();
    let gain = Gain {
        channel_count: 3,
        gains: vec![1.0, 2.0, -1.0],
    }
    .instantiate("gain", &manager, &[dc.as_ref()])
    .unwrap();
    route_all(&manager, gain.as_ref());

    let mut out = [0.0f32; 12];
    processor.process(&mut out);
    assert_eq!(&out[..3], &[0.5, 1.0, -0.5]);
    assert_eq!(&out[9..], &[0.5, 1.0, -0.5]);
}

#[test]
fn filter_without_input_leaves_nothing_registered() {
    let (manager, _processor) = engine(4, 1);
    let filter = Filter {
        channel_count: 2,
        ..Filter::default()
    };
    let err = filter.instantiate("lp", &manager, &[]).err().unwrap();
    assert!(matches!(err, ObjectError::MissingInput { index: 0, .. }));
    assert_eq!(manager.live_node_count(), 0);
}

#[test]
fn dc_passes_a_low_pass_and_is_removed_by_a_high_pass() {
    let (manager, mut processor) = engine(100, 2);
    let dc = Constant {
        channel_count: 1,
        values: vec![1.0],
    }
    .instantiate("dc", &manager, &[])
    .unwrap();
    let lp = Filter {
        channel_count: 1,
        mode: FilterMode::LowPass,
        frequencies: vec![50.0],
        ..Filter::default()
    }
    .instantiate("lp", &manager, &[dc.as_ref()])
    .unwrap();
    let hp = Filter {
        channel_count: 1,
        mode: FilterMode::HighPass,
        frequencies: vec![50.0],
        ..Filter::default()
    }
    .instantiate("hp", &manager, &[dc.as_ref()])
    .unwrap();
    manager.route(0, lp.output_for_channel(0).unwrap()).unwrap();
    manager.route(1, hp.output_for_channel(0).unwrap()).unwrap();

    let mut out = vec![0.0f32; 2000];
    processor.process(&mut out);
    let last = &out[out.len() - 2..];
    assert!((last[0] - 1.0).abs() < 1e-3, "low pass settled at {}", last[0]);
    assert!(last[1].abs() < 1e-3, "high pass settled at {}", last[1]);
}

#[test]
fn channel_controls_change_parameters_live() {
    let (manager, mut processor) = engine(4, 2);
    let mut osc = Oscillator::new(Waveform::Sine);
    osc.channel_count = 2;
    osc.frequencies = vec![250.0];
    osc.phases = vec![0.25];
    let osc = strata_core::MultiChannelObjectInstance::init(osc, "osc", &manager, &[]).unwrap();
    route_all(&manager, &osc);

    let mut out = [0.0f32; 8];
    processor.process(&mut out);
    assert!((out[0] - 1.0).abs() < 1e-3);
    assert!((out[1] - 1.0).abs() < 1e-3);

    osc.channel(1).unwrap().set_amplitude(0.0, 0);
    processor.process(&mut out);
    assert!((out[0] - 1.0).abs() < 1e-3);
    assert!(out.iter().skip(1).step_by(2).all(|&s| s.abs() < 1e-6));
}

// ---------------------------------------------------------------------------
// 2. Playback and capture
// ---------------------------------------------------------------------------

#[test]
fn buffer_player_through_gain_into_capture() {
    let (manager, mut processor) = engine(4, 2);
    let buffer = AudioBuffer::new(
        vec![vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![-1.0; 6]],
        1000.0,
    );
    let player = BufferPlayer::new(buffer)
        .instantiate("player", &manager, &[])
        .unwrap();
    let gain = Gain {
        channel_count: 2,
        gains: vec![0.5],
    }
    .instantiate("gain", &manager, &[player.as_ref()])
    .unwrap();
    let capture = Capture {
        channel_count: 2,
        blocks: 8,
    }
    .init("tap", &manager, &[gain.as_ref()])
    .unwrap();

    // Nothing is routed to the host; the capture is a root and pulls the chain.
    let mut out = [0.0f32; 16];
    processor.process(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));

    let channels = capture.drain();
    assert_eq!(
        channels[0],
        vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 0.0, 0.0]
    );
    assert_eq!(channels[1][..6], [-0.5; 6]);
}

#[test]
fn releasing_a_captured_source_captures_silence() {
    let (manager, mut processor) = engine(4, 1);
    let dc = Constant {
        channel_count: 1,
        values: vec![0.75],
    }
    .instantiate("dc", &manager, &[])
    .unwrap();
    let capture = Capture::default()
        .init("tap", &manager, &[dc.as_ref()])
        .unwrap();

    let mut out = [0.0f32; 4];
    processor.process(&mut out);
    drop(dc);
    processor.process(&mut out);

    let captured = capture.drain().remove(0);
    assert_eq!(&captured[..4], &[0.75; 4]);
    assert_eq!(&captured[4..], &[0.0; 4]);
}

// ---------------------------------------------------------------------------
// 3. Polyphony from library nodes
// ---------------------------------------------------------------------------

struct SynthVoice {
    oscillator: strata_core::SafeOwner<OscillatorControl>,
    _vca: strata_core::SafeOwner<strata_core::SmoothedValueHandle>,
}

fn synth_voice(
    wave: &Arc<WaveTable>,
    ctx: &VoiceContext<'_>,
) -> Result<VoiceGraph<SynthVoice>, ObjectError> {
    let (osc, control) = OscillatorNode::new(Arc::clone(wave), 250.0);
    let oscillator = ctx.manager.register_with(osc, control)?;
    let (vca, handle) = GainNode::new(2, 1.0);
    let vca = ctx.manager.register_with(vca, handle)?;
    ctx.manager.connect(oscillator.output(0), vca.input(0))?;
    ctx.manager.connect(ctx.envelope, vca.input(1))?;
    Ok(VoiceGraph {
        outputs: vec![vca.output(0)],
        payload: SynthVoice {
            oscillator,
            _vca: vca,
        },
    })
}

#[test]
fn oscillator_voices_sound_only_while_playing() {
    let (manager, mut processor) = engine(8, 1);
    let wave = Arc::new(WaveTable::new(1000, Waveform::Square, 1));
    let mut synth = PolyphonicObjectInstance::init(
        PolyphonicObject::new(2, 1),
        "synth",
        &manager,
        &|ctx: &VoiceContext<'_>| synth_voice(&wave, ctx),
    )
    .unwrap();
    route_all(&manager, &synth);

    let mut out = [0.0f32; 8];
    processor.process(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));

    let shape = EnvelopeShape::new(0.0, 0.0, 1.0, 0.0);
    let id = synth
        .play(shape, |voice| voice.oscillator.set_frequency(midi_to_hz(45.0), 0.0))
        .unwrap();
    processor.process(&mut out);
    assert!(out.iter().any(|&s| s.abs() > 0.5), "{out:?}");
    assert_eq!(synth.voice_state(id.index), Some(VoiceState::Active));

    synth.release(id);
    processor.process(&mut out);
    processor.process(&mut out);
    assert!(out.iter().all(|&s| s == 0.0));
    synth.poll_events();
    assert_eq!(synth.reclaim(), 1);
    assert_eq!(synth.busy_voice_count(), 0);
}

#[test]
fn two_voices_sum_into_the_same_channel() {
    let (manager, mut processor) = engine(4, 1);
    let mut pool = PolyphonicObjectInstance::init(
        PolyphonicObject::new(4, 1),
        "pads",
        &manager,
        &|ctx: &VoiceContext<'_>| -> Result<VoiceGraph<_>, ObjectError> {
            let (vca, handle) = GainNode::new(1, 0.25);
            let vca = ctx.manager.register_with(vca, handle)?;
            ctx.manager.connect(ctx.envelope, vca.input(0))?;
            Ok(VoiceGraph {
                outputs: vec![vca.output(0)],
                payload: vca,
            })
        },
    )
    .unwrap();
    route_all(&manager, &pool);

    let shape = EnvelopeShape::new(0.0, 0.0, 1.0, 50.0);
    pool.play(shape, |_| {}).unwrap();
    pool.play(shape, |_| {}).unwrap();

    let mut out = [0.0f32; 4];
    processor.process(&mut out);
    assert_eq!(out, [0.5; 4]);
}

// ---------------------------------------------------------------------------
// 4. Looping
// ---------------------------------------------------------------------------

/// Expected looper output at `frame` for a buffer holding its own frame
/// index, with a 10 ms crossfade, loop 20..60 ms and passes chained at block
/// boundaries.
fn looped_ramp(frame: usize) -> f32 {
    let sample = |position: usize| position as f32;
    match frame {
        0..10 => (frame + 1) as f32 / 10.0 * sample(frame),
        10..50 => sample(frame),
        _ => {
            let phase = (frame - 50) % 30;
            if phase < 10 {
                let fade_in = (phase + 1) as f32 / 10.0;
                let fade_out = (9 - phase) as f32 / 10.0;
                fade_out * sample(50 + phase) + fade_in * sample(20 + phase)
            } else {
                sample(20 + phase)
            }
        }
    }
}

#[test]
fn looper_crossfades_across_the_loop_boundary() {
    let (manager, mut processor) = engine(10, 2);
    let ramp: Vec<f32> = (0..80).map(|i| i as f32).collect();
    let inverted = ramp.iter().map(|s| -s).collect();
    let settings = BufferLooper {
        crossfade_ms: 10.0,
        loop_start_ms: 20.0,
        loop_end_ms: 60.0,
        ..BufferLooper::new(AudioBuffer::new(vec![ramp, inverted], 1000.0))
    };
    let mut looper = BufferLooperInstance::init(settings, "looper", &manager).unwrap();
    route_all(&manager, &looper);

    // Three passes over the loop after the first one.
    let mut rendered = Vec::new();
    let mut block = [0.0f32; 20];
    for _ in 0..14 {
        processor.process(&mut block);
        rendered.extend_from_slice(&block);
        looper.update().unwrap();
    }

    for (frame, samples) in rendered.chunks(2).enumerate() {
        let expected = looped_ramp(frame);
        assert!(
            (samples[0] - expected).abs() < 1e-3,
            "frame {frame}: {} != {expected}",
            samples[0]
        );
        assert!((samples[1] + expected).abs() < 1e-3, "frame {frame}");
    }
    // Loop frame 29 is fully faded in at frame 59, and frame 60 carries on at 30.
    assert!((rendered[59 * 2] - 29.0).abs() < 1e-3);
    assert!((rendered[60 * 2] - 30.0).abs() < 1e-3);
    assert!(looper.is_playing());
    assert!(looper.busy_voice_count() <= 2);
}
