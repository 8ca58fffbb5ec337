//! Audio device listing command.

use clap::{Args, Subcommand};
use strata_io::{default_output_device, list_output_devices};

#[derive(Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    command: Option<DevicesCommand>,
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// List all output devices
    List,

    /// Show default output device information
    Info,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(DevicesCommand::List) {
        DevicesCommand::List => {
            let outputs = list_output_devices()?;
            if outputs.is_empty() {
                println!("No audio output devices found.");
                return Ok(());
            }

            println!("Output Devices");
            println!("==============\n");
            for device in &outputs {
                println!(
                    "  [{}] {} ({} ch, {} Hz)",
                    device.index, device.name, device.default_channels, device.default_sample_rate
                );
            }
            println!();
            println!("Tip: Use device index or partial name with --device:");
            println!("  strata play patch.toml --device 0");
            println!("  strata play patch.toml --device \"USB\"");
        }

        DevicesCommand::Info => {
            println!("Default Output Device");
            println!("=====================\n");
            match default_output_device()? {
                Some(device) => {
                    println!("  Name: {}", device.name);
                    println!("  Index: {}", device.index);
                    println!("  Channels: {}", device.default_channels);
                    println!("  Sample Rate: {} Hz", device.default_sample_rate);
                }
                None => println!("  None"),
            }
        }
    }

    Ok(())
}
