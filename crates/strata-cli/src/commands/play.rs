//! Real-time playback of a patch.

use super::common::{engine_summary, load_patch};
use clap::Args;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use strata_io::{AudioOutput, StreamConfig};

#[derive(Args)]
pub struct PlayArgs {
    /// Patch file
    #[arg(value_name = "PATCH")]
    patch: PathBuf,

    /// Output device (index, exact name, or partial name)
    #[arg(short, long)]
    device: Option<String>,

    /// Device buffer size in frames
    #[arg(short, long, default_value = "256")]
    buffer_size: u32,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Override the patch's sample rate
    #[arg(long)]
    sample_rate: Option<u32>,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let patch = load_patch(&args.patch, args.sample_rate)?;
    println!("Loading '{}' ({})", patch.name, engine_summary(&patch));

    // The instance owns the nodes; it must outlive the stream.
    let (instance, processor) = patch.build()?;
    println!(
        "  {} object(s), {} node(s)",
        instance.len(),
        instance.manager().live_node_count()
    );

    let config = StreamConfig {
        sample_rate: patch.engine.sample_rate,
        buffer_size: args.buffer_size,
        output_device: args.device,
    };
    let output = AudioOutput::start(processor, &config)?;
    println!(
        "Playing on {} ({} ch, {} Hz). Press Ctrl+C to stop.",
        output.device_name(),
        output.channels(),
        output.sample_rate()
    );

    let running = output.running_flag();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        running.store(false, Ordering::SeqCst);
    })?;

    let deadline = args
        .seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| Instant::now() + Duration::from_secs_f64(s));
    while output.is_running() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            output.stop();
            break;
        }
        // Frees nodes the audio thread has handed back.
        instance.manager().collect_garbage();
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(output);
    drop(instance);
    println!("Done.");
    Ok(())
}
