use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::data::spectrum::Spectrum;
use crate::error::SpectrumError;

/// Ion polarity of a scan, matched against the scan's filter string
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Substring of the instrument filter string identifying this polarity.
    pub fn filter_tag(&self) -> &'static str {
        match self {
            Polarity::Positive => "+ p",
            Polarity::Negative => "- p",
        }
    }

    pub fn matches(&self, filter_string: &str) -> bool {
        filter_string.contains(self.filter_tag())
    }
}

impl FromStr for Polarity {
    type Err = SpectrumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Polarity::Positive),
            "negative" => Ok(Polarity::Negative),
            other => Err(SpectrumError::InvalidPolarity(Some(other.to_string()))),
        }
    }
}

/// Which scans contribute to the combined spectrum
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSelection {
    /// Every scan of the requested polarity
    #[default]
    All,
    /// Scans of the requested polarity whose TIC exceeds three mean absolute deviations
    Apex,
    /// An explicit list of scan indices, taken as given
    Indices(Vec<usize>),
}

/// Peak representation requested from each scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakType {
    #[default]
    Peaks,
    Centroided,
    Reprofiled,
}

impl fmt::Display for PeakType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakType::Peaks => write!(f, "raw"),
            PeakType::Centroided => write!(f, "centroided"),
            PeakType::Reprofiled => write!(f, "reprofiled"),
        }
    }
}

/// One scan as handed over by an instrument data reader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanRecord {
    pub index: usize,
    pub ms_level: u8,
    pub filter_string: Option<String>,
    pub total_ion_current: Option<f64>,
    /// Raw (mass, intensity) pairs
    pub peaks: Vec<(f64, f64)>,
    pub centroided: Option<Vec<(f64, f64)>>,
    pub reprofiled: Option<Vec<(f64, f64)>>,
}

impl ScanRecord {
    fn peaks_of(&self, peak_type: PeakType) -> Result<&[(f64, f64)], SpectrumError> {
        let peaks = match peak_type {
            PeakType::Peaks => Some(&self.peaks),
            PeakType::Centroided => self.centroided.as_ref(),
            PeakType::Reprofiled => self.reprofiled.as_ref(),
        };
        peaks
            .map(|p| p.as_slice())
            .ok_or(SpectrumError::MissingPeaks { scan: self.index, peak_type })
    }
}

/// A reader of instrument scans.
///
/// File-format parsing lives behind this trait; the loader only sees scan records.
pub trait ScanSource {
    fn read_scans(&mut self) -> Result<Vec<ScanRecord>, SpectrumError>;
}

impl ScanSource for Vec<ScanRecord> {
    fn read_scans(&mut self) -> Result<Vec<ScanRecord>, SpectrumError> {
        Ok(self.clone())
    }
}

/// Configuration for combining instrument scans into one spectrum
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Required; loading fails without it
    pub polarity: Option<Polarity>,
    pub scan_selection: ScanSelection,
    pub peak_type: PeakType,
    /// Relative mass tolerance for MS1 scans (default: 5e-6)
    pub ms1_precision: f64,
    /// Relative mass tolerance for MSn scans and for the combined spectrum (default: 5e-6)
    pub msn_precision: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            polarity: None,
            scan_selection: ScanSelection::All,
            peak_type: PeakType::Peaks,
            ms1_precision: 5e-6,
            msn_precision: 5e-6,
        }
    }
}

/// Merge peaks lying within `precision * mass` of each other.
///
/// Peaks are sorted by mass first. Merged peaks sum their intensities and take the
/// intensity-weighted mean mass.
///
/// # Example
///
/// ```rust
/// # use dimscore::data::loader::merge_peaks;
/// let merged = merge_peaks(vec![(200.0, 1.0), (100.0, 3.0), (100.0002, 1.0)], 5e-6);
/// assert_eq!(merged.len(), 2);
/// assert_eq!(merged[0].1, 4.0);
/// assert_eq!(merged[1], (200.0, 1.0));
/// ```
pub fn merge_peaks(peaks: Vec<(f64, f64)>, precision: f64) -> Vec<(f64, f64)> {
    peaks.into_iter()
        .sorted_by_key(|&(mz, _)| OrderedFloat(mz))
        .coalesce(|(mz_a, int_a), (mz_b, int_b)| {
            if mz_b - mz_a <= precision * mz_a {
                let total = int_a + int_b;
                let mz = if total > 0.0 { (mz_a * int_a + mz_b * int_b) / total } else { mz_a };
                Ok((mz, total))
            } else {
                Err(((mz_a, int_a), (mz_b, int_b)))
            }
        })
        .collect()
}

/// Indices of scans whose TIC exceeds `3 * mean(|tic - mean(tic)|)`.
pub fn apex_scans(tics: &[(usize, f64)]) -> Vec<usize> {
    if tics.is_empty() {
        return Vec::new();
    }
    let mean_tic = tics.iter().map(|(_, tic)| *tic).mean();
    let threshold = 3.0 * tics.iter().map(|(_, tic)| (tic - mean_tic).abs()).mean();

    tics.iter()
        .filter(|(_, tic)| *tic > threshold)
        .map(|(index, _)| *index)
        .collect()
}

/// Combines the scans of a `ScanSource` into a single `Spectrum`.
#[derive(Clone, Debug)]
pub struct SpectrumLoader {
    pub identifier: String,
    pub config: LoaderConfig,
}

impl SpectrumLoader {
    pub fn new(identifier: impl Into<String>, config: LoaderConfig) -> Self {
        SpectrumLoader { identifier: identifier.into(), config }
    }

    fn select_scans(&self, polarity: Polarity, scans: &[ScanRecord]) -> BTreeSet<usize> {
        let matching = scans.iter()
            .filter(|scan| scan.filter_string.as_deref().is_some_and(|f| polarity.matches(f)));

        match &self.config.scan_selection {
            ScanSelection::All => matching.map(|scan| scan.index).collect(),
            ScanSelection::Apex => {
                let tics: Vec<(usize, f64)> = matching
                    .filter_map(|scan| scan.total_ion_current.map(|tic| (scan.index, tic)))
                    .collect();
                apex_scans(&tics).into_iter().collect()
            }
            ScanSelection::Indices(indices) => indices.iter().cloned().collect(),
        }
    }

    /// Read, select and merge scans into one spectrum with ascending masses.
    ///
    /// # Errors
    ///
    /// `SpectrumError::InvalidPolarity` when no polarity is configured, before the source is
    /// touched; `SpectrumError::MissingPeaks` when a selected scan lacks the requested peak list.
    pub fn load<S: ScanSource>(&self, source: &mut S) -> Result<Spectrum, SpectrumError> {
        let polarity = self.config.polarity.ok_or(SpectrumError::InvalidPolarity(None))?;
        SpectrumError::check_positive("ms1_precision", self.config.ms1_precision)?;
        SpectrumError::check_positive("msn_precision", self.config.msn_precision)?;

        let scans = source.read_scans()?;
        let selected = self.select_scans(polarity, &scans);

        let mut combined: Vec<(f64, f64)> = Vec::new();
        for scan in scans.iter().filter(|scan| selected.contains(&scan.index)) {
            let precision = if scan.ms_level <= 1 { self.config.ms1_precision } else { self.config.msn_precision };
            let peaks = scan.peaks_of(self.config.peak_type)?;
            combined.extend(merge_peaks(peaks.to_vec(), precision));
        }

        if selected.is_empty() {
            warn!(identifier = %self.identifier, "no scans matched the selection");
        }
        info!(identifier = %self.identifier, scans = selected.len(), peaks = combined.len(), peak_type = %self.config.peak_type, "combining scans");

        let (masses, intensities): (Vec<f64>, Vec<f64>) = merge_peaks(combined, self.config.msn_precision)
            .into_iter()
            .unzip();

        Spectrum::new(self.identifier.clone(), masses, intensities)
    }
}
