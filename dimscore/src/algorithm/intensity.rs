use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};

use crate::error::SpectrumError;

/// Intensity normalization methods
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Scale by total ion current, then by the median intensity
    #[default]
    Tic,
    None,
}

impl Normalization {
    /// Apply the normalization to a set of intensities.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use dimscore::algorithm::intensity::Normalization;
    /// let normalized = Normalization::Tic.apply(&[1.0, 2.0, 7.0]).unwrap();
    /// // sum 10, median 2
    /// assert!((normalized[2] - 1.4).abs() < 1e-12);
    /// ```
    pub fn apply(&self, intensities: &[f64]) -> Result<Vec<f64>, SpectrumError> {
        match self {
            Normalization::Tic => tic_normalize(intensities),
            Normalization::None => Ok(intensities.to_vec()),
        }
    }
}

impl FromStr for Normalization {
    type Err = SpectrumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tic" => Ok(Normalization::Tic),
            "none" => Ok(Normalization::None),
            other => Err(SpectrumError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalization::Tic => write!(f, "tic"),
            Normalization::None => write!(f, "none"),
        }
    }
}

/// Elementwise intensity transforms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    Log10,
    None,
}

impl Transform {
    pub fn apply(&self, intensities: &[f64]) -> Result<Vec<f64>, SpectrumError> {
        match self {
            Transform::Log10 => log10_transform(intensities),
            Transform::None => Ok(intensities.to_vec()),
        }
    }
}

impl FromStr for Transform {
    type Err = SpectrumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "log10" => Ok(Transform::Log10),
            "none" => Ok(Transform::None),
            other => Err(SpectrumError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Log10 => write!(f, "log10"),
            Transform::None => write!(f, "none"),
        }
    }
}

/// Rescale every intensity by `(x / sum) * median`.
pub fn tic_normalize(intensities: &[f64]) -> Result<Vec<f64>, SpectrumError> {
    if intensities.is_empty() {
        return Err(SpectrumError::EmptySpectrum);
    }

    let total: f64 = intensities.iter().sum();
    if !total.is_finite() || total == 0.0 {
        return Err(SpectrumError::InvalidParameter { name: "total_ion_current", value: total });
    }
    let median = Data::new(intensities.to_vec()).median();

    Ok(intensities.iter().map(|&x| (x / total) * median).collect())
}

/// Base-10 logarithm of every intensity; non-positive or non-finite values are rejected.
pub fn log10_transform(intensities: &[f64]) -> Result<Vec<f64>, SpectrumError> {
    if let Some((index, &value)) = intensities.iter().find_position(|&&x| !(x.is_finite() && x > 0.0)) {
        return Err(SpectrumError::InvalidValue { index, value });
    }
    Ok(intensities.iter().map(|x| x.log10()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log10_transform() {
        let transformed = log10_transform(&[1.0, 10.0, 100.0]).unwrap();
        assert_eq!(transformed, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_log10_rejects_non_positive() {
        let result = log10_transform(&[5.0, 0.0, 3.0]);
        assert!(matches!(result, Err(SpectrumError::InvalidValue { index: 1, .. })));
        let result = Transform::Log10.apply(&[5.0, f64::NAN]);
        assert!(matches!(result, Err(SpectrumError::InvalidValue { index: 1, .. })));
    }

    #[test]
    fn test_tic_preserves_ordering() {
        let intensities = vec![3.0, 50.0, 1.0, 12.0, 7.5];
        let normalized = tic_normalize(&intensities).unwrap();
        for i in 0..intensities.len() {
            for j in 0..intensities.len() {
                assert_eq!(intensities[i] < intensities[j], normalized[i] < normalized[j]);
            }
        }
        // median 7.5, sum 73.5
        assert!((normalized[1] - 50.0 / 73.5 * 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_tic_even_length_median() {
        let normalized = tic_normalize(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        // median 2.5, sum 10
        assert!((normalized[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tic_rejects_zero_sum() {
        assert!(tic_normalize(&[0.0, 0.0]).is_err());
        assert!(matches!(tic_normalize(&[]), Err(SpectrumError::EmptySpectrum)));
    }

    #[test]
    fn test_none_is_identity() {
        let values = vec![0.0, -1.0, 2.0];
        assert_eq!(Normalization::None.apply(&values).unwrap(), values);
        assert_eq!(Transform::None.apply(&values).unwrap(), values);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("TIC".parse::<Normalization>().unwrap(), Normalization::Tic);
        assert_eq!("log10".parse::<Transform>().unwrap(), Transform::Log10);
        assert!(matches!("quantile".parse::<Normalization>(), Err(SpectrumError::UnknownMethod(_))));
        assert!(matches!("ln".parse::<Transform>(), Err(SpectrumError::UnknownMethod(_))));
    }
}
