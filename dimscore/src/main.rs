mod cli;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use clap::Parser;
use serde::Deserialize;
use tracing::subscriber::set_global_default;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

use dimscore::processing::{process_batch, ProcessingConfig};
use dimscore::{Spectrum, SpectrumError};

use crate::cli::{Args, Commands, ProcessArgs, WriteConfigArgs};

#[derive(Deserialize)]
#[serde(untagged)]
enum SpectrumInput {
    One(Spectrum),
    Many(Vec<Spectrum>),
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, SpectrumError> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    })
}

fn main_process(args: ProcessArgs) -> Result<(), SpectrumError> {
    let config = match &args.config {
        Some(path) => ProcessingConfig::from_json_file(path)?,
        None => ProcessingConfig::default(),
    };

    let reader = BufReader::new(File::open(&args.input)?);
    let spectra = match serde_json::from_reader(reader)? {
        SpectrumInput::One(spectrum) => vec![spectrum],
        SpectrumInput::Many(spectra) => spectra,
    };
    info!(input = %args.input.display(), spectra = spectra.len(), "read spectra");

    let mut processed = Vec::new();
    let mut first_error = None;
    for result in process_batch(spectra, &config, args.num_threads)? {
        match result {
            Ok(spectrum) => processed.push(spectrum),
            Err(e) => {
                error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    let mut out = open_output(args.output.as_deref())?;
    serde_json::to_writer_pretty(&mut out, &processed)?;
    writeln!(out)?;

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main_write_config(args: WriteConfigArgs) -> Result<(), SpectrumError> {
    let mut out = open_output(args.output.as_deref())?;
    serde_json::to_writer_pretty(&mut out, &ProcessingConfig::default())?;
    writeln!(out)?;
    Ok(())
}

fn main() -> Result<(), SpectrumError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_span_events(FmtSpan::CLOSE));

    set_global_default(subscriber).expect("Setting default subscriber failed");
    let args = Args::parse();

    match args.command {
        Some(Commands::Process(args)) => main_process(args)?,
        Some(Commands::WriteConfig(args)) => main_write_config(args)?,
        None => {
            println!("No command provided");
        }
    }
    Ok(())
}
