use thiserror::Error;

use crate::data::loader::PeakType;

/// Errors raised while loading or processing a spectrum.
///
/// Every fallible operation on a `Spectrum` either commits its full result or
/// returns one of these and leaves the spectrum as it was.
#[derive(Error, Debug)]
pub enum SpectrumError {
    #[error("polarity must be one of 'positive' or 'negative', got {0:?}")]
    InvalidPolarity(Option<String>),

    #[error("spectrum contains no data points")]
    EmptySpectrum,

    #[error("masses and intensities differ in length: {masses} vs {intensities}")]
    LengthMismatch { masses: usize, intensities: usize },

    #[error("no residual below the fitted baseline at iteration {iteration}")]
    EmptyNegativeResiduals { iteration: usize },

    #[error("penalized system could not be solved: {0}")]
    SingularSystem(String),

    #[error("invalid intensity {value} at index {index}")]
    InvalidValue { index: usize, value: f64 },

    #[error("invalid value {value} for parameter '{name}'")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("scan {scan} has no {peak_type} peak list")]
    MissingPeaks { scan: usize, peak_type: PeakType },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl SpectrumError {
    pub(crate) fn check_lengths(masses: usize, intensities: usize) -> Result<(), SpectrumError> {
        if masses != intensities {
            return Err(SpectrumError::LengthMismatch { masses, intensities });
        }
        Ok(())
    }

    pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), SpectrumError> {
        if !(value.is_finite() && value > 0.0) {
            return Err(SpectrumError::InvalidParameter { name, value });
        }
        Ok(())
    }
}
