use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vmafsweep")]
#[command(author, version, about = "Benchmark encoder presets and CRF values by VMAF score")]
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
    /// Encode and score every preset/CRF combination and write a CSV report
    Run {
        /// Source video to benchmark
        #[arg(required = true)]
        input: PathBuf,

        /// Report file to write
        #[arg(short, long, default_value = "vmafsweep.csv")]
        output: PathBuf,

        /// Number of jobs to run at once
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Extra ffmpeg arguments, split on whitespace (preset and CRF are added per job)
        #[arg(long, allow_hyphen_values = true)]
        extra_args: Option<String>,

        /// Comma-separated list of presets
        #[arg(long, value_delimiter = ',')]
        presets: Option<Vec<String>>,

        /// Lowest CRF to test
        #[arg(long)]
        crf_min: Option<u32>,

        /// Highest CRF to test
        #[arg(long)]
        crf_max: Option<u32>,

        /// Encode+score cycles allowed per job when no score is produced
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Directory for encoded outputs (a temporary directory by default)
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Keep encoded outputs after scoring
        #[arg(long)]
        keep_encodes: bool,
    },

    /// Print the jobs a run would execute, without running them
    Grid {
        /// Comma-separated list of presets
        #[arg(long, value_delimiter = ',')]
        presets: Option<Vec<String>>,

        /// Lowest CRF to test
        #[arg(long)]
        crf_min: Option<u32>,

        /// Highest CRF to test
        #[arg(long)]
        crf_max: Option<u32>,
    },

    /// Probe a media file and print its duration
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
