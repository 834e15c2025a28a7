use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::algorithm::baseline::BaselineConfig;
use crate::algorithm::binning::BinningConfig;
use crate::algorithm::intensity::{Normalization, Transform};
use crate::data::spectrum::Spectrum;
use crate::error::SpectrumError;

/// Configuration for spectrum preprocessing
///
/// Each stage is optional; stages run in the order baseline, binning, smoothing,
/// normalization, transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// airPLS baseline removal (default: enabled with default parameters)
    pub baseline: Option<BaselineConfig>,
    /// Regridding onto fixed-width bins (default: 0.25 wide, empty bins dropped)
    pub binning: Option<BinningConfig>,
    /// Standard deviation of the Gaussian smoothing kernel (default: disabled)
    pub smoothing_sigma: Option<f64>,
    /// (default: tic)
    pub normalization: Normalization,
    /// (default: log10)
    pub transform: Transform,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            baseline: Some(BaselineConfig::default()),
            binning: Some(BinningConfig::default()),
            smoothing_sigma: None,
            normalization: Normalization::Tic,
            transform: Transform::Log10,
        }
    }
}

impl ProcessingConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SpectrumError> {
        let reader = BufReader::new(File::open(path)?);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    }
}

/// Run the configured stages on a spectrum.
///
/// # Arguments
/// * `spectrum` - the spectrum to process, consumed
/// * `config` - processing configuration
///
/// # Returns
/// The processed spectrum, or the first error raised by a stage
pub fn process_spectrum(mut spectrum: Spectrum, config: &ProcessingConfig) -> Result<Spectrum, SpectrumError> {
    let n_input = spectrum.len();

    if let Some(baseline) = &config.baseline {
        spectrum.correct_baseline(baseline)?;
    }
    if let Some(binning) = &config.binning {
        spectrum.bin(binning)?;
    }
    if let Some(sigma) = config.smoothing_sigma {
        spectrum.smooth(sigma)?;
    }
    spectrum
        .normalize(config.normalization)?
        .transform(config.transform)?;

    debug!(identifier = %spectrum.identifier(), n_input, n_output = spectrum.len(), "processed spectrum");
    Ok(spectrum)
}

/// Process a batch of spectra in parallel.
///
/// # Arguments
/// * `spectra` - independent spectra
/// * `config` - processing configuration shared by all spectra
/// * `num_threads` - number of threads to use for parallel processing
///
/// # Returns
/// One result per input spectrum, in input order
pub fn process_batch(
    spectra: Vec<Spectrum>,
    config: &ProcessingConfig,
    num_threads: usize,
) -> Result<Vec<Result<Spectrum, SpectrumError>>, SpectrumError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?;

    info!(spectra = spectra.len(), num_threads, "processing batch");

    Ok(pool.install(|| {
        spectra
            .into_par_iter()
            .map(|spectrum| process_spectrum(spectrum, config))
            .collect()
    }))
}
