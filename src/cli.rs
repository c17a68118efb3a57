use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Headless driver for the morph simulation engine.
#[derive(Parser, Debug)]
#[command(name = "morph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a grid, simulate it and rebuild its index buffers
    Run {
        /// Engine configuration file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Grid samples per axis (clamped to 2..=500)
        #[arg(short, long)]
        samples: Option<u32>,

        /// Number of simulation iterations
        #[arg(short = 'n', long)]
        iters: Option<u32>,

        /// WGSL kernel file replacing the built-in kernel
        #[arg(short, long)]
        kernel: Option<PathBuf>,

        /// Write the resulting node store as JSON
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// List the user uniforms a kernel declares
    Uniforms {
        /// WGSL kernel file (the built-in kernel when omitted)
        kernel: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a grid and print its node and index counts
    Grid {
        /// Grid samples per axis (clamped to 2..=500)
        #[arg(short, long, default_value = "100")]
        samples: u32,
    },
}
