//! Object type listing.

use clap::Args;
use strata_config::ObjectKind;

#[derive(Args)]
pub struct ObjectsArgs {
    /// Show a single object type
    #[arg(value_name = "TYPE")]
    object_type: Option<String>,
}

fn describe(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Constant => "constant value per channel",
        ObjectKind::Gain => "multiplies its inputs by a per-channel gain",
        ObjectKind::Oscillator => "band-limited wavetable oscillator, optional FM input",
        ObjectKind::Filter => "resonant filter over one input",
        ObjectKind::BufferPlayer => "plays a WAV file, one channel per file channel",
    }
}

fn inputs(kind: ObjectKind) -> String {
    match kind.input_range() {
        (0, 0) => "none".to_string(),
        (min, usize::MAX) => format!("{min} or more"),
        (min, max) if min == max => min.to_string(),
        (min, max) => format!("{min} to {max}"),
    }
}

pub fn run(args: ObjectsArgs) -> anyhow::Result<()> {
    if let Some(name) = args.object_type {
        let Some(kind) = ObjectKind::from_name(&name) else {
            anyhow::bail!("Unknown object type '{name}'. Run 'strata objects' for the list.");
        };
        println!("{}", kind.name());
        println!("  {}", describe(kind));
        println!("  Inputs: {}", inputs(kind));
        println!("  Parameters: {}", kind.params().join(", "));
        return Ok(());
    }

    println!("Available Objects");
    println!("=================\n");
    for kind in ObjectKind::ALL {
        println!("  {:<14} {}", kind.name(), describe(kind));
    }
    println!();
    println!("Run 'strata objects <TYPE>' for parameters.");
    Ok(())
}
