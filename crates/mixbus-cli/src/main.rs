//! Command-line front end for the mixbus real-time audio routing
//! server core: device listing plus output/input smoke tests against a
//! real `cpal` backend.

mod cpal_device;
mod devices;
mod error;
mod loopback;
mod record;

use clap::{Parser, Subcommand};

use error::CliResult;

#[derive(Parser)]
#[command(name = "mixbus")]
#[command(author, version, about = "Mixbus routing server CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available audio devices
    Devices,
    /// Play a sine tone through a real output device
    Loopback(loopback::LoopbackArgs),
    /// Capture from a real input device to a WAV file
    Record(record::RecordArgs),
}

fn main() -> CliResult<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => devices::run(),
        Commands::Loopback(args) => loopback::run(args),
        Commands::Record(args) => record::run(args),
    }
}
