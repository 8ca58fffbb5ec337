//! Strata CLI - render, play and check audio graph patches.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about = "Strata audio graph CLI", long_about = None)]
struct Cli {
    /// Log graph activity (repeat for more detail). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a patch offline into a WAV file
    Render(commands::render::RenderArgs),

    /// Play a patch on an audio output device
    Play(commands::play::PlayArgs),

    /// Validate a patch and print its structure
    Check(commands::check::CheckArgs),

    /// List object types and their parameters
    Objects(commands::objects::ObjectsArgs),

    /// List and inspect audio devices
    Devices(commands::devices::DevicesArgs),
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // Logs go to stderr so command output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Objects(args) => commands::objects::run(args),
        Commands::Devices(args) => commands::devices::run(args),
    }
}
