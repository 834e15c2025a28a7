use crate::error::SpectrumError;

/// Kernel half-width in units of sigma.
const TRUNCATE: f64 = 4.0;

/// Largest kernel half-width, in samples, that a filter will allocate.
const MAX_KERNEL_RADIUS: f64 = (1u64 << 20) as f64;

/// Normalized Gaussian kernel of radius `round(TRUNCATE * sigma)`.
pub fn gaussian_kernel(sigma: f64) -> Result<Vec<f64>, SpectrumError> {
    SpectrumError::check_positive("sigma", sigma)?;

    let half_width = TRUNCATE * sigma + 0.5;
    if half_width > MAX_KERNEL_RADIUS {
        return Err(SpectrumError::InvalidParameter { name: "sigma", value: sigma });
    }

    let radius = half_width as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// Map an out-of-range index back into `0..n` by mirroring about the array edges
/// (`d c b a | a b c d | d c b a`).
fn reflect_index(index: i64, n: i64) -> usize {
    let period = 2 * n;
    let folded = index.rem_euclid(period);
    if folded < n {
        folded as usize
    } else {
        (period - 1 - folded) as usize
    }
}

/// Convolve a signal with a Gaussian kernel of standard deviation `sigma`.
///
/// # Example
///
/// ```rust
/// # use dimscore::algorithm::smoothing::gaussian_filter;
/// let smoothed = gaussian_filter(&[0.0, 0.0, 10.0, 0.0, 0.0], 1.0).unwrap();
/// assert_eq!(smoothed.len(), 5);
/// assert!(smoothed[2] < 10.0 && smoothed[1] > 0.0);
/// ```
pub fn gaussian_filter(values: &[f64], sigma: f64) -> Result<Vec<f64>, SpectrumError> {
    let kernel = gaussian_kernel(sigma)?;
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let n = values.len() as i64;
    let radius = (kernel.len() / 2) as i64;

    let smoothed: Vec<f64> = (0..n)
        .map(|i| {
            kernel.iter()
                .enumerate()
                .map(|(k, w)| w * values[reflect_index(i + k as i64 - radius, n)])
                .sum::<f64>()
        })
        .collect();

    Ok(smoothed)
}
