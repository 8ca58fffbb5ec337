//! Offline rendering of a patch into a WAV file.

use super::common::{engine_summary, load_patch};
use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use strata_core::linear_to_db;
use strata_io::{WavSpec, render_interleaved, write_wav};

#[derive(Args)]
pub struct RenderArgs {
    /// Patch file
    #[arg(value_name = "PATCH")]
    patch: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Length to render in seconds
    #[arg(short, long, default_value = "5.0")]
    seconds: f64,

    /// Output bit depth (16, 24, or 32 for float)
    #[arg(short, long, default_value = "32")]
    bit_depth: u16,

    /// Override the patch's sample rate
    #[arg(long)]
    sample_rate: Option<u32>,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        anyhow::bail!("--seconds must be a positive number, got {}", args.seconds);
    }

    let patch = load_patch(&args.patch, args.sample_rate)?;
    println!("Rendering '{}' ({})", patch.name, engine_summary(&patch));

    let (_instance, mut processor) = patch.build()?;
    let sample_rate = patch.engine.sample_rate;
    let channels = processor.output_channels();
    let frames = (args.seconds * f64::from(sample_rate)).round() as usize;

    let pb = ProgressBar::new(frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );
    let samples = render_interleaved(&mut processor, frames, |done| pb.set_position(done as u64));
    pb.finish_and_clear();

    let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    let peak_db = linear_to_db(peak);
    if peak > 1.0 {
        tracing::warn!(peak_db, "rendered output clips");
    }

    let spec = WavSpec {
        channels: u16::try_from(channels).context("too many output channels for WAV")?,
        sample_rate,
        bits_per_sample: args.bit_depth,
    };
    write_wav(&args.output, &samples, spec)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "Wrote {} frames ({:.2}s, peak {:.1} dBFS) to {}",
        frames,
        frames as f64 / f64::from(sample_rate),
        peak_db,
        args.output.display()
    );
    Ok(())
}
