use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tamperscope")]
#[command(
    author,
    version,
    about = "Find trim, crop and rotate edits in MP4/MOV files and recover left-over frames"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze files or directories for edits and unreferenced frames
    Analyze {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output reports as JSON
        #[arg(long)]
        json: bool,

        /// Write the output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker threads (defaults to config, then one per CPU)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Write decodable recovered frames as elementary streams here
        #[arg(long)]
        extract_dir: Option<PathBuf>,

        /// Check recovered frames with ffmpeg
        #[arg(long)]
        verify: bool,
    },

    /// Print the box tree of a file
    Boxes {
        /// File to read
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that optional external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
