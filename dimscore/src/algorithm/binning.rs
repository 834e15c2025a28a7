use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SpectrumError;

/// Tolerance, in units of bin width, for snapping a mass onto the next bin edge.
const EDGE_SNAP: f64 = 1e-9;

/// Largest grid that is materialized when empty bins are kept.
const MAX_KEPT_BINS: usize = 1 << 24;

/// What to do with bins that received no samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyBins {
    #[default]
    Drop,
    /// Keep the bin and mark its intensity as missing with `f64::NAN`
    Keep,
}

/// Configuration for regridding a spectrum onto fixed-width mass bins
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningConfig {
    /// Bin width in mass units (default: 0.25)
    pub width: f64,
    /// Handling of bins without samples (default: drop)
    pub empty_bins: EmptyBins,
}

impl Default for BinningConfig {
    fn default() -> Self {
        BinningConfig {
            width: 0.25,
            empty_bins: EmptyBins::Drop,
        }
    }
}

/// One cell of the mass grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Bin {
    /// Left edge of the bin
    pub mass: f64,
    /// Mean intensity of the samples in the bin, `None` if it is empty
    pub mean: Option<f64>,
    pub count: usize,
}

/// Uniform mass grid starting at `origin` with step `width`.
#[derive(Clone, Debug, PartialEq)]
pub struct MassGrid {
    pub origin: f64,
    pub width: f64,
    pub num_bins: usize,
}

impl MassGrid {
    /// Build the grid covering `masses`.
    ///
    /// The origin is the minimum mass rounded half-to-even to the nearest integer, stepped
    /// back by whole widths while it lies above the minimum. Bins are half-open
    /// `[edge, edge + width)` and are added until the maximum mass is covered.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use dimscore::algorithm::binning::MassGrid;
    /// let grid = MassGrid::covering(&[1.0, 1.1, 1.9, 2.05], 1.0).unwrap();
    /// assert_eq!(grid.origin, 1.0);
    /// assert_eq!(grid.num_bins, 2);
    /// assert_eq!(grid.edge(1), 2.0);
    ///
    /// let grid = MassGrid::covering(&[200.6, 201.7], 0.25).unwrap();
    /// assert_eq!(grid.origin, 200.5);
    /// ```
    pub fn covering(masses: &[f64], width: f64) -> Result<MassGrid, SpectrumError> {
        SpectrumError::check_positive("width", width)?;

        let (min, max) = masses.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &m| {
            (lo.min(m), hi.max(m))
        });
        if !(min.is_finite() && max.is_finite()) {
            return Err(SpectrumError::EmptySpectrum);
        }

        let mut origin = min.round_ties_even();
        if min < origin {
            origin -= ((origin - min) / width - EDGE_SNAP).ceil() * width;
        }

        let span = ((max - origin) / width + EDGE_SNAP).floor();
        if !(span.is_finite() && span < usize::MAX as f64) {
            return Err(SpectrumError::InvalidParameter { name: "width", value: width });
        }

        Ok(MassGrid { origin, width, num_bins: span as usize + 1 })
    }

    pub fn edge(&self, index: usize) -> f64 {
        self.origin + index as f64 * self.width
    }

    /// Index of the bin holding `mass`, or `None` if it falls outside the grid.
    pub fn locate(&self, mass: f64) -> Option<usize> {
        let position = (mass - self.origin) / self.width + EDGE_SNAP;
        if position < 0.0 || !position.is_finite() {
            return None;
        }
        let index = position.floor() as usize;
        (index < self.num_bins).then_some(index)
    }
}

/// Aggregate samples into the bins of a grid by their mean intensity.
///
/// # Arguments
///
/// * `masses` - sample positions
/// * `intensities` - sample values, index-aligned with `masses`
/// * `width` - bin width
/// * `empty_bins` - whether bins without samples are part of the result
///
/// # Returns
///
/// The bins in increasing mass order. With `EmptyBins::Keep` every bin of the grid is
/// returned, which fails with `InvalidParameter` for grids too large to hold.
pub fn binned_means(
    masses: &[f64],
    intensities: &[f64],
    width: f64,
    empty_bins: EmptyBins,
) -> Result<Vec<Bin>, SpectrumError> {
    SpectrumError::check_lengths(masses.len(), intensities.len())?;
    if masses.is_empty() {
        return Err(SpectrumError::EmptySpectrum);
    }

    let grid = MassGrid::covering(masses, width)?;
    if empty_bins == EmptyBins::Keep && grid.num_bins > MAX_KEPT_BINS {
        return Err(SpectrumError::InvalidParameter { name: "width", value: width });
    }

    let mut sums: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for (&mass, &intensity) in masses.iter().zip(intensities.iter()) {
        if let Some(index) = grid.locate(mass) {
            let entry = sums.entry(index).or_insert((0.0, 0));
            entry.0 += intensity;
            entry.1 += 1;
        }
    }

    let bins = match empty_bins {
        EmptyBins::Drop => sums.into_iter()
            .map(|(index, (sum, count))| Bin {
                mass: grid.edge(index),
                mean: Some(sum / count as f64),
                count,
            })
            .collect(),
        EmptyBins::Keep => (0..grid.num_bins)
            .map(|index| {
                let (sum, count) = sums.get(&index).copied().unwrap_or((0.0, 0));
                Bin {
                    mass: grid.edge(index),
                    mean: (count > 0).then(|| sum / count as f64),
                    count,
                }
            })
            .collect(),
    };

    Ok(bins)
}

/// Regrid a spectrum onto fixed-width bins.
///
/// # Returns
///
/// Tuple of (binned_masses, binned_intensities); empty bins are dropped or carry `f64::NAN`
/// depending on `config.empty_bins`.
///
/// # Example
///
/// ```rust
/// # use dimscore::algorithm::binning::{bin_spectrum, BinningConfig, EmptyBins};
/// let config = BinningConfig { width: 1.0, empty_bins: EmptyBins::Drop };
/// let (mz, intensity) = bin_spectrum(&[1.0, 1.1, 1.9, 2.05], &[10.0, 20.0, 5.0, 8.0], &config).unwrap();
/// assert_eq!(mz, vec![1.0, 2.0]);
/// assert!((intensity[0] - 35.0 / 3.0).abs() < 1e-12);
/// assert_eq!(intensity[1], 8.0);
/// ```
pub fn bin_spectrum(
    masses: &[f64],
    intensities: &[f64],
    config: &BinningConfig,
) -> Result<(Vec<f64>, Vec<f64>), SpectrumError> {
    let bins = binned_means(masses, intensities, config.width, config.empty_bins)?;

    Ok(bins.into_iter()
        .map(|bin| (bin.mass, bin.mean.unwrap_or(f64::NAN)))
        .unzip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_spectrum_two_bins() {
        let config = BinningConfig { width: 1.0, ..Default::default() };
        let (mz, intensity) = bin_spectrum(&[1.0, 1.1, 1.9, 2.05], &[10.0, 20.0, 5.0, 8.0], &config).unwrap();
        assert_eq!(mz, vec![1.0, 2.0]);
        // bins are half-open, so 1.9 averages with 1.0 and 1.1 in [1, 2)
        assert!((intensity[0] - 35.0 / 3.0).abs() < 1e-12);
        assert!((intensity[1] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_bins_dropped_or_kept() {
        let masses = vec![100.0, 100.1, 101.6];
        let intensities = vec![2.0, 4.0, 9.0];

        let (mz, intensity) = bin_spectrum(&masses, &intensities, &BinningConfig::default()).unwrap();
        assert_eq!(mz, vec![100.0, 101.5]);
        assert_eq!(intensity, vec![3.0, 9.0]);

        let keep = BinningConfig { empty_bins: EmptyBins::Keep, ..Default::default() };
        let (mz, intensity) = bin_spectrum(&masses, &intensities, &keep).unwrap();
        assert_eq!(mz, vec![100.0, 100.25, 100.5, 100.75, 101.0, 101.25, 101.5]);
        assert_eq!(intensity.len(), mz.len());
        assert_eq!(intensity[0], 3.0);
        assert!(intensity[1..6].iter().all(|v| v.is_nan()));
        assert_eq!(intensity[6], 9.0);
    }

    #[test]
    fn test_origin_steps_back_below_minimum() {
        // round(1.6) = 2, so the origin moves down one width to keep 1.6 and 1.9
        let (mz, intensity) = bin_spectrum(&[1.6, 1.9, 2.2], &[1.0, 2.0, 3.0], &BinningConfig { width: 0.5, ..Default::default() }).unwrap();
        assert_eq!(mz, vec![1.5, 2.0]);
        assert_eq!(intensity, vec![1.5, 3.0]);
    }

    #[test]
    fn test_rebinning_keeps_bins_whose_edge_rounds_up() {
        let config = BinningConfig::default();
        let (mz_once, int_once) = bin_spectrum(&[200.6, 201.7], &[5.0, 7.0], &config).unwrap();
        assert_eq!(mz_once, vec![200.5, 201.5]);
        assert_eq!(int_once, vec![5.0, 7.0]);

        let (mz_twice, int_twice) = bin_spectrum(&mz_once, &int_once, &config).unwrap();
        assert_eq!(mz_twice, mz_once);
        assert_eq!(int_twice, int_once);
    }

    #[test]
    fn test_binning_is_idempotent() {
        let masses: Vec<f64> = (0..400).map(|i| 200.0 + i as f64 * 0.037).collect();
        let intensities: Vec<f64> = (0..400).map(|i| ((i * 7919) % 113) as f64 + 1.0).collect();
        let config = BinningConfig::default();

        let (mz_once, int_once) = bin_spectrum(&masses, &intensities, &config).unwrap();
        let (mz_twice, int_twice) = bin_spectrum(&mz_once, &int_once, &config).unwrap();

        assert_eq!(mz_once, mz_twice);
        assert_eq!(int_once, int_twice);
    }

    #[test]
    fn test_grid_locate() {
        let grid = MassGrid { origin: 10.0, width: 0.25, num_bins: 4 };
        assert_eq!(grid.locate(9.99), None);
        assert_eq!(grid.locate(10.0), Some(0));
        assert_eq!(grid.locate(10.3), Some(1));
        assert_eq!(grid.locate(10.75), Some(3));
        assert_eq!(grid.locate(11.0), None);
    }

    #[test]
    fn test_binning_rejects_bad_input() {
        assert!(matches!(bin_spectrum(&[], &[], &BinningConfig::default()), Err(SpectrumError::EmptySpectrum)));
        assert!(matches!(bin_spectrum(&[1.0], &[], &BinningConfig::default()), Err(SpectrumError::LengthMismatch { .. })));
        let config = BinningConfig { width: 0.0, ..Default::default() };
        assert!(matches!(bin_spectrum(&[1.0], &[1.0], &config), Err(SpectrumError::InvalidParameter { name: "width", .. })));
    }

    #[test]
    fn test_fine_grid_only_holds_occupied_bins() {
        let masses = [100.0, 2000.0];
        let bins = binned_means(&masses, &[1.0, 2.0], 1e-6, EmptyBins::Drop).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].mass, 100.0);
        assert_eq!(bins[1].count, 1);
        assert_eq!(bins[1].mean, Some(2.0));

        let keep = BinningConfig { width: 1e-6, empty_bins: EmptyBins::Keep };
        assert!(matches!(bin_spectrum(&masses, &[1.0, 2.0], &keep), Err(SpectrumError::InvalidParameter { name: "width", .. })));
    }

    #[test]
    fn test_degenerate_width_is_rejected() {
        let config = BinningConfig { width: 1e-300, ..Default::default() };
        assert!(matches!(bin_spectrum(&[1.0, 1e10], &[1.0, 1.0], &config), Err(SpectrumError::InvalidParameter { name: "width", .. })));
    }
}
