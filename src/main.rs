use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use splits_ingest::{parse_event_data, print_event_summary, write_splits_csv, OutputOptions};

/// Reads orienteering results files and prints their splits
#[derive(Parser, Debug)]
#[command(name = "splits_ingest", version, about)]
struct Args {
    /// Results files in SI, CSV, OE, HTML or IOF XML format
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Also write the splits of each file to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Compute and print time lost at each control
    #[arg(long)]
    time_losses: bool,

    /// Log reader decisions
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let options = OutputOptions {
        show_time_losses: args.time_losses,
        ..OutputOptions::default()
    };

    for (index, path) in args.files.iter().enumerate() {
        let text = fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;

        let Some(mut event) =
            parse_event_data(&text).with_context(|| format!("Could not parse {}", path.display()))?
        else {
            bail!("{} is not in any recognised results format", path.display());
        };

        if args.time_losses {
            if event.needs_repair() {
                event.accept_original_times()?;
            }
            event.determine_time_losses()?;
            event.compute_ranks();
        }

        println!("\n=== {} ===", path.display());
        print_event_summary(&event, &options);

        if let Some(csv_path) = &args.csv {
            // One output file per input beyond the first
            let csv_path = if index == 0 {
                csv_path.clone()
            } else {
                let stem = csv_path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
                csv_path.with_file_name(format!("{}_{}.csv", stem, index + 1))
            };
            if let Err(e) = write_splits_csv(&event, &csv_path) {
                warn!(path = %csv_path.display(), error = %e, "could not write splits CSV");
            }
        }
    }

    Ok(())
}
