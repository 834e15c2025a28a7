use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithm::baseline::{air_pls, BaselineConfig};
use crate::algorithm::binning::{bin_spectrum, BinningConfig};
use crate::algorithm::intensity::{Normalization, Transform};
use crate::algorithm::smoothing::gaussian_filter;
use crate::error::SpectrumError;

/// Serialized form of a spectrum, checked on the way in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectrumRecord {
    pub identifier: String,
    pub masses: Vec<f64>,
    pub intensities: Vec<f64>,
}

/// Represents a mass spectrum with an identifier, masses and index-aligned intensities.
///
/// `masses` and `intensities` always have the same length. Processing methods mutate the
/// spectrum in place and return `&mut Self`, so they chain with `?`. A method that fails
/// leaves the spectrum untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpectrumRecord", into = "SpectrumRecord")]
pub struct Spectrum {
    identifier: String,
    masses: Vec<f64>,
    intensities: Vec<f64>,
}

impl TryFrom<SpectrumRecord> for Spectrum {
    type Error = SpectrumError;

    fn try_from(record: SpectrumRecord) -> Result<Self, Self::Error> {
        Spectrum::new(record.identifier, record.masses, record.intensities)
    }
}

impl From<Spectrum> for SpectrumRecord {
    fn from(spectrum: Spectrum) -> Self {
        SpectrumRecord {
            identifier: spectrum.identifier,
            masses: spectrum.masses,
            intensities: spectrum.intensities,
        }
    }
}

impl Spectrum {
    /// Constructs a new `Spectrum`.
    ///
    /// # Arguments
    ///
    /// * `identifier` - A label for the spectrum, e.g. the sample name.
    /// * `masses` - A vector of m/z values, ascending by convention.
    /// * `intensities` - A vector of intensity values corresponding to the m/z values.
    ///
    /// # Errors
    ///
    /// `SpectrumError::LengthMismatch` if `masses` and `intensities` differ in length.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use dimscore::data::spectrum::Spectrum;
    /// let spectrum = Spectrum::new("sample_1", vec![100.0, 200.0], vec![10.0, 20.0]).unwrap();
    /// assert_eq!(spectrum.masses(), &[100.0, 200.0]);
    /// assert_eq!(spectrum.intensities(), &[10.0, 20.0]);
    /// assert!(Spectrum::new("broken", vec![100.0], vec![]).is_err());
    /// ```
    pub fn new(identifier: impl Into<String>, masses: Vec<f64>, intensities: Vec<f64>) -> Result<Self, SpectrumError> {
        SpectrumError::check_lengths(masses.len(), intensities.len())?;
        Ok(Spectrum { identifier: identifier.into(), masses, intensities })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = identifier.into();
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<f64>, Vec<f64>) {
        (self.identifier, self.masses, self.intensities)
    }

    /// Sum of all intensities.
    pub fn total_ion_current(&self) -> f64 {
        self.intensities.iter().sum()
    }

    /// The (mass, intensity) pair with the highest intensity, if any.
    pub fn base_peak(&self) -> Option<(f64, f64)> {
        self.masses.iter()
            .cloned()
            .zip(self.intensities.iter().cloned())
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn require_data(&self) -> Result<(), SpectrumError> {
        if self.is_empty() {
            return Err(SpectrumError::EmptySpectrum);
        }
        Ok(())
    }

    fn commit(&mut self, masses: Vec<f64>, intensities: Vec<f64>) -> Result<&mut Self, SpectrumError> {
        SpectrumError::check_lengths(masses.len(), intensities.len())?;
        self.masses = masses;
        self.intensities = intensities;
        Ok(self)
    }

    /// Remove the airPLS baseline.
    ///
    /// Keeps the samples whose intensity lies strictly above the fitted baseline. Kept samples
    /// retain their original intensity, not the baseline-subtracted one.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use dimscore::data::spectrum::Spectrum;
    /// # use dimscore::algorithm::baseline::BaselineConfig;
    /// let masses: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.1).collect();
    /// let intensities: Vec<f64> = (0..60).map(|i| if i == 30 { 80.0 } else { 4.0 }).collect();
    /// let mut spectrum = Spectrum::new("s", masses, intensities).unwrap();
    /// spectrum.correct_baseline(&BaselineConfig::default()).unwrap();
    /// assert!(spectrum.intensities().contains(&80.0));
    /// ```
    pub fn correct_baseline(&mut self, config: &BaselineConfig) -> Result<&mut Self, SpectrumError> {
        self.require_data()?;
        let baseline = air_pls(&self.intensities, config)?;

        let (masses, intensities): (Vec<f64>, Vec<f64>) = self.masses.iter()
            .zip(self.intensities.iter())
            .zip(baseline.iter())
            .filter(|((_, &intensity), &background)| intensity - background > 0.0)
            .map(|((&mass, &intensity), _)| (mass, intensity))
            .unzip();

        debug!(identifier = %self.identifier, before = self.len(), after = masses.len(), "baseline corrected");
        self.commit(masses, intensities)
    }

    /// Regrid onto fixed-width mass bins, averaging the intensities within each bin.
    pub fn bin(&mut self, config: &BinningConfig) -> Result<&mut Self, SpectrumError> {
        self.require_data()?;
        let (masses, intensities) = bin_spectrum(&self.masses, &self.intensities, config)?;

        debug!(identifier = %self.identifier, before = self.len(), after = masses.len(), width = config.width, "binned");
        self.commit(masses, intensities)
    }

    /// Gaussian smoothing of the intensities; masses are left as they are.
    pub fn smooth(&mut self, sigma: f64) -> Result<&mut Self, SpectrumError> {
        self.require_data()?;
        let intensities = gaussian_filter(&self.intensities, sigma)?;
        self.intensities = intensities;
        Ok(self)
    }

    pub fn normalize(&mut self, method: Normalization) -> Result<&mut Self, SpectrumError> {
        self.require_data()?;
        let intensities = method.apply(&self.intensities)?;
        self.intensities = intensities;
        Ok(self)
    }

    pub fn transform(&mut self, method: Transform) -> Result<&mut Self, SpectrumError> {
        self.require_data()?;
        let intensities = method.apply(&self.intensities)?;
        self.intensities = intensities;
        Ok(self)
    }
}

/// Formats the `Spectrum` for display.
impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.base_peak() {
            Some((mz, i)) => write!(f, "Spectrum({}, data points: {}, max by intensity:({:.3}, {}))", self.identifier, self.len(), mz, i),
            None => write!(f, "Spectrum({}, data points: 0)", self.identifier),
        }
    }
}
