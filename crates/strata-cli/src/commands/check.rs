//! Patch validation and structure dump.

use super::common::{engine_summary, load_patch};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct CheckArgs {
    /// Patch file
    #[arg(value_name = "PATCH")]
    patch: PathBuf,

    /// Also instantiate the patch, loading any audio files it references
    #[arg(long)]
    build: bool,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let patch = load_patch(&args.patch, None)?;

    println!("Patch: {}", patch.name);
    if let Some(description) = &patch.description {
        println!("  {description}");
    }
    println!("Engine: {}", engine_summary(&patch));
    println!();

    println!("Objects:");
    for object in &patch.objects {
        let channels = object
            .channels
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        let inputs = if object.inputs.is_empty() {
            String::new()
        } else {
            format!(" <- {}", object.inputs.join(", "))
        };
        println!(
            "  {:<16} {:<14} ch {:<3}{}",
            object.id, object.object_type, channels, inputs
        );
    }
    if !patch.outputs.is_empty() {
        println!("Outputs:");
        for output in &patch.outputs {
            match &output.channels {
                Some(channels) => println!("  {} -> {:?}", output.object, channels),
                None => println!("  {} -> all", output.object),
            }
        }
    }
    println!();

    strata_config::validate_patch(&patch)?;
    if args.build {
        let (instance, _processor) = patch.build()?;
        println!(
            "OK: built {} object(s) with {} node(s)",
            instance.len(),
            instance.manager().live_node_count()
        );
    } else {
        println!("OK");
    }
    Ok(())
}
