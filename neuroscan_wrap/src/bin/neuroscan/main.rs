//! neuroscan
//!
//! Segments nuclei and motor neurons in 3D CZI microscopy volumes and writes
//! one label stack per channel next to each source file.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::debug;
use std::path::PathBuf;

mod segment;

#[derive(Parser, Debug)]
#[clap(
    name = "neuroscan",
    version,
    about = "Segment nuclei and motor neurons in 3D microscopy volumes"
)]
struct NeuroscanCli {
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Segment a CZI file, or every CZI file below a folder.
    ///
    /// Writes <name>_motor.tiff and <name>_nuclei.tiff next to each source.
    /// Channels whose output already exists are skipped, so an interrupted
    /// run can be restarted with the same arguments.
    Segment(segment::SegmentArgs),

    /// Quantify segmented objects.
    Quantify {
        /// A segmented CZI file or folder
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match NeuroscanCli::parse().subcmd {
        SubCommand::Segment(args) => segment::run(&args),
        SubCommand::Quantify { path } => {
            debug!("quantify requested for {}", path.display());
            println!("Not Implemented");
            Ok(())
        }
    }
}
