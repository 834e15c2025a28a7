use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the preprocessing pipeline on one or more spectra.
    Process(ProcessArgs),
    /// Write the default processing configuration.
    WriteConfig(WriteConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ProcessArgs {
    /// JSON file holding a spectrum or a list of spectra.
    #[arg(short, long)]
    pub input: PathBuf,

    /// JSON file with the processing configuration; defaults are used when absent.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Where to write the processed spectra; stdout when absent.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of threads used for batches.
    #[arg(short, long, default_value_t = 4)]
    pub num_threads: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct WriteConfigArgs {
    /// Where to write the configuration; stdout when absent.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
