// CLI-specific types and structures
// This module contains the command-line interface definitions for fpmap

use anyhow::{bail, Result};
use clap::Parser;

use functor_pool::PoolConfig;

/// Built-in line transforms
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransformKind {
    #[default]
    Upper,
    Lower,
    Reverse,
    Len,
    Sha256,
    Xxh3,
}

#[derive(Parser, Debug)]
#[command(name = "fpmap")]
#[command(about = "Map a line transform over input in parallel, keeping input order")]
#[command(
    long_about = "Map a line transform over input in parallel, keeping input order\n\nLines are read from the given files in order (stdin if none), split into chunks,\nprocessed on a pool of worker threads and written back in their original order.\n\nCOMMON EXAMPLES:\n  fpmap -t sha256 passwords.txt\n  cat access.log | fpmap -t upper -j 8 -c 256"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Input files (stdin if not specified, or use "-" to explicitly specify stdin)
    pub files: Vec<String>,

    /// Transform applied to every line
    #[arg(
        short = 't',
        long = "transform",
        value_enum,
        default_value_t = TransformKind::Upper,
        help_heading = "Processing Options"
    )]
    pub transform: TransformKind,

    /// Number of worker threads (0 = one per CPU)
    #[arg(
        short = 'j',
        long = "threads",
        default_value_t = 0,
        help_heading = "Performance Options"
    )]
    pub threads: usize,

    /// Lines per chunk sent to a worker
    #[arg(
        short = 'c',
        long = "chunk-size",
        default_value_t = 64,
        help_heading = "Performance Options"
    )]
    pub chunk_size: usize,

    /// Print pool statistics to stderr when done
    #[arg(long = "stats", help_heading = "Metrics and Stats")]
    pub stats: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Error Handling")]
    pub verbose: u8,
}

impl Cli {
    /// Map the performance flags onto a pool configuration
    pub fn pool_config(&self) -> Result<PoolConfig> {
        if self.chunk_size == 0 {
            bail!("--chunk-size must be at least 1");
        }

        let mut config = PoolConfig::default().with_chunk_size(self.chunk_size);
        if self.threads > 0 {
            config = config.with_num_workers(self.threads);
        }
        Ok(config)
    }

    /// Default log filter for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
