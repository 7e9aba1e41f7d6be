//! Command-line interface for the cxx2c transpiler.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cxx2c")]
#[command(about = "Transpile a practical C++ subset to C", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Transpile input files and write one .c file per input
    Build {
        /// Input C++ source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory for generated .c files (defaults to each input's directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Number of files transpiled concurrently
        #[arg(short, long, default_value_t = 4)]
        jobs: usize,
    },
    /// Report diagnostics without writing any output
    Check {
        /// Input C++ source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
