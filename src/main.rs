mod commands;

use clap::{Parser, Subcommand};
use commands::IoArgs;
use commands::compensate::compensate_command;
use commands::convert::convert_command;
use std::error::Error;
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gpx2footprint",
    about = "Convert GPX track logs into footprint CSV files"
)]
struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write one footprint CSV row per track point")]
    Convert {
        #[command(flatten)]
        args: IoArgs,
    },
    #[command(
        about = "Write footprint CSV rows, inserting interpolated points across long gaps"
    )]
    Compensate {
        /// Largest allowed distance between consecutive points, in meters
        #[arg(long, value_name = "METERS", value_parser = parse_max_distance)]
        max_distance: f64,

        #[command(flatten)]
        args: IoArgs,
    },
}

fn parse_max_distance(s: &str) -> Result<f64, String> {
    let value: f64 = s.trim().parse().map_err(|e| format!("{e}"))?;
    gpx2footprint::validate_max_distance(value).map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Convert { args } => convert_command(&args),
        Commands::Compensate { max_distance, args } => compensate_command(max_distance, &args),
    }
}
