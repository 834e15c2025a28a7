use nalgebra::DMatrix;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SpectrumError;

/// Relative residual mass below which the reweighting loop stops early.
const CONVERGENCE_RATIO: f64 = 0.001;

/// Configuration for adaptive iteratively reweighted penalized least squares (airPLS)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Smoothness penalty, larger values give a stiffer background (default: 100.0)
    pub lambda: f64,
    /// Order of the finite difference used in the penalty term (default: 1).
    /// Only the penalty depends on it; smoother weights always come from the reweighting loop.
    pub porder: usize,
    /// Upper bound on reweighting rounds (default: 15)
    pub max_iterations: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        BaselineConfig {
            lambda: 100.0,
            porder: 1,
            max_iterations: 15,
        }
    }
}

impl BaselineConfig {
    pub fn validate(&self) -> Result<(), SpectrumError> {
        SpectrumError::check_positive("lambda", self.lambda)?;
        if self.porder == 0 {
            return Err(SpectrumError::InvalidParameter { name: "porder", value: 0.0 });
        }
        if self.max_iterations == 0 {
            return Err(SpectrumError::InvalidParameter { name: "max_iterations", value: 0.0 });
        }
        Ok(())
    }
}

/// Coefficients of one row of the `order`-th forward difference operator.
///
/// # Example
///
/// ```rust
/// # use dimscore::algorithm::baseline::difference_coefficients;
/// assert_eq!(difference_coefficients(1), vec![-1.0, 1.0]);
/// assert_eq!(difference_coefficients(2), vec![1.0, -2.0, 1.0]);
/// ```
pub fn difference_coefficients(order: usize) -> Vec<f64> {
    let mut coefficients = vec![1.0];
    for _ in 0..order {
        let mut next = vec![0.0; coefficients.len() + 1];
        for (a, c) in coefficients.iter().enumerate() {
            next[a] -= c;
            next[a + 1] += c;
        }
        coefficients = next;
    }
    coefficients
}

/// Assemble `diag(w) + lambda * DᵀD` in compressed sparse column form.
fn penalized_system(weights: &[f64], lambda: f64, porder: usize) -> CscMatrix<f64> {
    let m = weights.len();
    let coefficients = difference_coefficients(porder);
    let mut coo = CooMatrix::new(m, m);

    for (i, &w) in weights.iter().enumerate() {
        coo.push(i, i, w);
    }

    // each row k of D touches columns k..=k+porder; DᵀD accumulates their outer products
    for k in 0..m.saturating_sub(porder) {
        for (a, ca) in coefficients.iter().enumerate() {
            for (b, cb) in coefficients.iter().enumerate() {
                coo.push(k + a, k + b, lambda * ca * cb);
            }
        }
    }

    CscMatrix::from(&coo)
}

/// Penalized weighted least-squares smoother (Whittaker smoother).
///
/// Solves `(diag(w) + lambda * DᵀD) z = w ∘ x` where `D` is the `porder`-th order
/// difference operator. Points with zero weight are interpolated by the penalty alone.
///
/// # Arguments
///
/// * `x` - signal to smooth
/// * `w` - per-point weights, same length as `x`
/// * `lambda` - smoothness penalty
/// * `porder` - difference order of the penalty
///
/// # Returns
///
/// The smoothed signal, or `SpectrumError::SingularSystem` if the system is not positive definite.
pub fn whittaker_smooth(x: &[f64], w: &[f64], lambda: f64, porder: usize) -> Result<Vec<f64>, SpectrumError> {
    SpectrumError::check_lengths(x.len(), w.len())?;
    if x.is_empty() {
        return Err(SpectrumError::EmptySpectrum);
    }

    let a = penalized_system(w, lambda, porder);
    let rhs: Vec<f64> = x.iter().zip(w.iter()).map(|(xi, wi)| xi * wi).collect();
    let b = DMatrix::from_column_slice(x.len(), 1, &rhs);

    let cholesky = CscCholesky::factor(&a)
        .map_err(|e| SpectrumError::SingularSystem(format!("{:?}", e)))?;
    let z = cholesky.solve(&b);

    if z.iter().any(|v| !v.is_finite()) {
        return Err(SpectrumError::SingularSystem("solution contains non-finite values".to_string()));
    }

    Ok(z.iter().cloned().collect())
}

/// Update the smoother weights from the residuals `d = x - z` of one round.
///
/// Points on or above the fit get weight zero, points below it `exp(i * |d| / dssn)`.
/// Both end points then share `exp(i * max_neg / dssn)`, where `max_neg` is the signed
/// maximum of the negative residuals; the value is set at the head and copied to the tail.
fn reweight(d: &[f64], dssn: f64, iteration: usize, weights: &mut [f64]) -> Result<(), SpectrumError> {
    let max_negative = d.iter()
        .cloned()
        .filter(|&r| r < 0.0)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or(SpectrumError::EmptyNegativeResiduals { iteration })?;

    let round = iteration as f64;
    for (w, &r) in weights.iter_mut().zip(d.iter()) {
        *w = if r >= 0.0 { 0.0 } else { (round * r.abs() / dssn).exp() };
    }

    let m = weights.len();
    weights[0] = (round * max_negative / dssn).exp();
    weights[m - 1] = weights[0];
    Ok(())
}

/// Estimate the baseline of a signal with airPLS.
///
/// Weights start at one. Every round fits a Whittaker smoother, then zeroes the weight of
/// points above the fit and grows the weight of points below it exponentially with the
/// size of their residual and the round number. Both end points receive one shared weight,
/// derived from the largest (closest to zero) negative residual.
///
/// # Arguments
///
/// * `intensities` - signal to fit
/// * `config` - penalty, difference order and iteration cap
///
/// # Returns
///
/// The baseline, same length as `intensities`.
///
/// # Example
///
/// ```rust
/// # use dimscore::algorithm::baseline::{air_pls, BaselineConfig};
/// let signal: Vec<f64> = (0..50).map(|i| if i == 25 { 60.0 } else { 5.0 }).collect();
/// let baseline = air_pls(&signal, &BaselineConfig::default()).unwrap();
/// assert_eq!(baseline.len(), signal.len());
/// assert!(baseline[25] < 10.0);
/// ```
pub fn air_pls(intensities: &[f64], config: &BaselineConfig) -> Result<Vec<f64>, SpectrumError> {
    config.validate()?;
    let m = intensities.len();
    if m == 0 {
        return Err(SpectrumError::EmptySpectrum);
    }

    let threshold = CONVERGENCE_RATIO * intensities.iter().map(|x| x.abs()).sum::<f64>();
    let mut weights = vec![1.0; m];
    let mut iteration = 1;

    loop {
        let z = whittaker_smooth(intensities, &weights, config.lambda, config.porder)?;
        let d: Vec<f64> = intensities.iter().zip(z.iter()).map(|(x, b)| x - b).collect();
        let dssn = d.iter().filter(|&&r| r < 0.0).sum::<f64>().abs();

        debug!(iteration, dssn, threshold, "airPLS round");

        if dssn < threshold {
            return Ok(z);
        }
        if iteration == config.max_iterations {
            warn!(iteration, dssn, threshold, "airPLS stopped at iteration cap before converging");
            return Ok(z);
        }

        reweight(&d, dssn, iteration, &mut weights)?;
        iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_with_peak(n: usize, level: f64, height: f64, center: f64, sigma: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64 - center;
                level + height * (-x * x / (2.0 * sigma * sigma)).exp()
            })
            .collect()
    }

    #[test]
    fn test_difference_coefficients() {
        assert_eq!(difference_coefficients(0), vec![1.0]);
        assert_eq!(difference_coefficients(3), vec![-1.0, 3.0, -3.0, 1.0]);
    }

    #[test]
    fn test_whittaker_preserves_constant() {
        let x = vec![4.0; 20];
        let w = vec![1.0; 20];
        let z = whittaker_smooth(&x, &w, 100.0, 1).unwrap();
        for v in z {
            assert!((v - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_whittaker_first_order_flattens_ramp() {
        let x: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let w = vec![1.0; 30];
        let z = whittaker_smooth(&x, &w, 100.0, 1).unwrap();
        // the first-order penalty pulls the ends of a ramp toward its mean
        assert!(z[0] > x[0] + 1.0);
        assert!(z[29] < x[29] - 1.0);
        let sum_x: f64 = x.iter().sum();
        let sum_z: f64 = z.iter().sum();
        assert!((sum_x - sum_z).abs() < 1e-6);
    }

    #[test]
    fn test_whittaker_second_order_keeps_ramp() {
        let x: Vec<f64> = (0..30).map(|i| 2.0 * i as f64 + 1.0).collect();
        let w = vec![1.0; 30];
        let z = whittaker_smooth(&x, &w, 100.0, 2).unwrap();
        for (a, b) in x.iter().zip(z.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_whittaker_zero_weights_is_singular() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let w = vec![0.0; 4];
        let result = whittaker_smooth(&x, &w, 1.0, 1);
        assert!(matches!(result, Err(SpectrumError::SingularSystem(_))));
    }

    #[test]
    fn test_whittaker_length_mismatch() {
        let result = whittaker_smooth(&[1.0, 2.0], &[1.0], 1.0, 1);
        assert!(matches!(result, Err(SpectrumError::LengthMismatch { .. })));
    }

    #[test]
    fn test_reweight_shares_one_boundary_weight() {
        // asymmetric tails: the head sits above the fit, the tail well below it
        let d = vec![2.0, -0.5, 1.0, -3.0, -1.5];
        let dssn = 5.0;
        let mut weights = vec![1.0; d.len()];
        reweight(&d, dssn, 2, &mut weights).unwrap();

        let boundary = (2.0 * -0.5 / dssn).exp();
        assert_eq!(weights[0], boundary);
        assert_eq!(weights[4], boundary);
        assert_eq!(weights[2], 0.0);
        assert_eq!(weights[1], (2.0 * 0.5 / dssn).exp());
        assert_eq!(weights[3], (2.0 * 3.0 / dssn).exp());
    }

    #[test]
    fn test_reweight_without_negative_residuals() {
        let mut weights = vec![1.0; 3];
        let result = reweight(&[0.0, 1.0, 2.0], 1.0, 4, &mut weights);
        assert!(matches!(result, Err(SpectrumError::EmptyNegativeResiduals { iteration: 4 })));
        assert_eq!(weights, vec![1.0; 3]);
    }

    #[test]
    fn test_air_pls_flat_signal_with_peak() {
        let signal = flat_with_peak(200, 10.0, 100.0, 100.0, 3.0);
        let baseline = air_pls(&signal, &BaselineConfig::default()).unwrap();

        assert_eq!(baseline.len(), signal.len());
        // near-flat far from the peak
        for i in (0..60).chain(140..200) {
            assert!((baseline[i] - 10.0).abs() < 0.05, "baseline[{}] = {}", i, baseline[i]);
        }
        // the peak is not absorbed into the background
        assert!(baseline[100] < 15.0);
        assert!(signal[100] - baseline[100] > 80.0);

        // flat samples sit at or below the fitted background
        let above = (0..60).chain(140..200)
            .filter(|&i| signal[i] - baseline[i] > 1e-3)
            .count();
        assert_eq!(above, 0);
    }

    #[test]
    fn test_air_pls_all_zero_signal_errors() {
        let signal = vec![0.0; 10];
        let result = air_pls(&signal, &BaselineConfig::default());
        assert!(matches!(result, Err(SpectrumError::EmptyNegativeResiduals { iteration: 1 })));
    }

    #[test]
    fn test_air_pls_single_iteration_returns_first_fit() {
        let signal = flat_with_peak(50, 2.0, 20.0, 25.0, 2.0);
        let config = BaselineConfig { max_iterations: 1, ..Default::default() };
        let baseline = air_pls(&signal, &config).unwrap();
        let w = vec![1.0; signal.len()];
        let smoothed = whittaker_smooth(&signal, &w, config.lambda, config.porder).unwrap();
        for (a, b) in baseline.iter().zip(smoothed.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_air_pls_rejects_empty_and_bad_config() {
        assert!(matches!(air_pls(&[], &BaselineConfig::default()), Err(SpectrumError::EmptySpectrum)));

        let config = BaselineConfig { lambda: -1.0, ..Default::default() };
        assert!(matches!(air_pls(&[1.0, 2.0], &config), Err(SpectrumError::InvalidParameter { name: "lambda", .. })));

        let config = BaselineConfig { porder: 0, ..Default::default() };
        assert!(matches!(air_pls(&[1.0, 2.0], &config), Err(SpectrumError::InvalidParameter { name: "porder", .. })));
    }

    #[test]
    fn test_air_pls_second_order_tracks_sloped_background() {
        let signal: Vec<f64> = flat_with_peak(200, 0.0, 50.0, 100.0, 3.0)
            .iter()
            .enumerate()
            .map(|(i, v)| v + 5.0 + 0.1 * i as f64)
            .collect();
        let config = BaselineConfig { porder: 2, ..Default::default() };
        let baseline = air_pls(&signal, &config).unwrap();
        assert!((baseline[20] - 7.0).abs() < 0.5);
        assert!((baseline[180] - 23.0).abs() < 0.5);
        assert!(baseline[100] < 20.0);
    }
}
