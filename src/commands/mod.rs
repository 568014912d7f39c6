pub mod compensate;
pub mod convert;

use clap::Args;
use gpx2footprint::{Conversion, export_file_name};
use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::info;

#[derive(Args)]
pub struct IoArgs {
    /// GPX file to read; stdin when omitted or `-`
    pub input: Option<PathBuf>,

    /// Write the CSV to this file instead of stdout
    #[arg(short, long, conflicts_with = "export_dir")]
    pub output: Option<PathBuf>,

    /// Write the CSV into this directory under the export file name
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,
}

pub fn read_input(path: Option<&Path>) -> Result<Vec<u8>, Box<dyn Error>> {
    match path {
        Some(path) if path != Path::new("-") => {
            Ok(fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?)
        }
        _ => {
            let mut input = Vec::new();
            io::stdin().lock().read_to_end(&mut input)?;
            Ok(input)
        }
    }
}

/// Writes the finished CSV where `args` asks for it, then reports the point
/// counts on stderr.
pub fn finish(args: &IoArgs, conversion: &Conversion) -> Result<(), Box<dyn Error>> {
    let destination = match (&args.output, &args.export_dir) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(dir)) => Some(dir.join(export_file_name(OffsetDateTime::now_utc()))),
        (None, None) => None,
    };

    match destination {
        Some(path) => {
            fs::write(&path, &conversion.csv)
                .map_err(|e| format!("cannot write {}: {e}", path.display()))?;
            info!(path = %path.display(), bytes = conversion.csv.len(), "wrote CSV");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&conversion.csv)?;
            stdout.flush()?;
        }
    }

    eprintln!("Points before: {}", conversion.points_before);
    eprintln!("Points after: {}", conversion.points_after);
    Ok(())
}
