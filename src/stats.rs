//! Residual error distribution: density histogram plus a fitted normal curve.

use statrs::distribution::{Continuous, Normal};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    /// Normalised so that the bin areas sum to 1.
    pub density: f64,
}

impl HistogramBin {
    pub fn center(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct ErrorDistribution {
    pub mean: f64,
    /// Population standard deviation (the maximum-likelihood normal fit).
    pub std: f64,
    pub bins: Vec<HistogramBin>,
    /// `(x, pdf(x))` across the histogram range; empty when `std` is zero.
    pub curve: Vec<(f64, f64)>,
}

impl ErrorDistribution {
    pub fn fit(residuals: &[f64], num_bins: usize) -> Option<Self> {
        if residuals.is_empty() || num_bins == 0 || residuals.iter().any(|r| !r.is_finite()) {
            return None;
        }

        let mean = residuals.iter().mean();
        let lo = residuals.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = residuals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std = residuals.iter().population_std_dev();
        // Rounding in the mean leaves a tiny spread on identical values.
        let std = if hi - lo <= 0.0 || std <= f64::EPSILON * mean.abs().max(1.0) {
            0.0
        } else {
            std
        };
        let bins = density_histogram(residuals, num_bins);

        let curve = match Normal::new(mean, std) {
            Ok(normal) if std > 0.0 => {
                let lo = bins.first().map(|b| b.start).unwrap_or(mean);
                let hi = bins.last().map(|b| b.end).unwrap_or(mean);
                linspace(lo, hi, 100)
                    .into_iter()
                    .map(|x| (x, normal.pdf(x)))
                    .collect()
            }
            _ => Vec::new(),
        };

        Some(Self {
            mean,
            std,
            bins,
            curve,
        })
    }

    pub fn max_density(&self) -> f64 {
        self.bins
            .iter()
            .map(|b| b.density)
            .chain(self.curve.iter().map(|&(_, y)| y))
            .fold(0.0, f64::max)
    }
}

/// Equal-width bins over `[min, max]`; a degenerate range widens to `[x - 0.5, x + 0.5]`.
pub fn density_histogram(values: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || num_bins == 0 {
        return Vec::new();
    }

    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo <= 0.0 {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / num_bins as f64;

    let mut counts = vec![0usize; num_bins];
    for &v in values {
        // The last bin is closed on the right.
        let idx = (((v - lo) / width) as usize).min(num_bins - 1);
        counts[idx] += 1;
    }

    let n = values.len() as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + i as f64 * width,
            end: lo + (i + 1) as f64 * width,
            density: count as f64 / (n * width),
        })
        .collect()
}

fn linspace(lo: f64, hi: f64, points: usize) -> Vec<f64> {
    if points < 2 {
        return vec![lo];
    }
    let step = (hi - lo) / (points - 1) as f64;
    (0..points).map(|i| lo + i as f64 * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn densities_integrate_to_one() {
        let values: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64 - 50.0).collect();
        let bins = density_histogram(&values, 30);

        assert_eq!(bins.len(), 30);
        let area: f64 = bins.iter().map(|b| b.density * b.width()).sum();
        assert!((area - 1.0).abs() < 1e-9);
        assert_eq!(bins[0].start, -50.0);
        assert!((bins[29].end - 50.0).abs() < 1e-9);
    }

    #[test]
    fn fit_reports_population_moments() {
        let dist = ErrorDistribution::fit(&[1.0, 2.0, 3.0, 4.0], 4).unwrap();
        assert!((dist.mean - 2.5).abs() < 1e-12);
        assert!((dist.std - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(dist.curve.len(), 100);

        // The curve peaks near the mean.
        let (peak_x, _) = dist
            .curve
            .iter()
            .copied()
            .fold((0.0, f64::MIN), |acc, p| if p.1 > acc.1 { p } else { acc });
        assert!((peak_x - 2.5).abs() < 0.1);
    }

    #[test]
    fn identical_residuals_have_no_curve() {
        let dist = ErrorDistribution::fit(&[0.7; 10], 30).unwrap();
        assert_eq!(dist.std, 0.0);
        assert!(dist.curve.is_empty());
        assert!((dist.bins[0].start - 0.2).abs() < 1e-12);
        assert!((dist.bins[29].end - 1.2).abs() < 1e-12);
        let area: f64 = dist.bins.iter().map(|b| b.density * b.width()).sum();
        assert!((area - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rounding_noise_is_not_a_spread() {
        for value in [0.7, -3.3, 1e6 + 0.1, 1e-9] {
            let dist = ErrorDistribution::fit(&[value; 17], 30).unwrap();
            assert_eq!(dist.std, 0.0, "value {value}");
            assert!(dist.curve.is_empty(), "value {value}");
        }

        let single = ErrorDistribution::fit(&[2.5], 30).unwrap();
        assert_eq!(single.std, 0.0);
        assert!(single.curve.is_empty());

        let spread = ErrorDistribution::fit(&[0.7, 0.7, 0.7, 0.71], 30).unwrap();
        assert!(spread.std > 0.0);
        assert_eq!(spread.curve.len(), 100);
    }

    #[test]
    fn empty_or_non_finite_input_has_no_distribution() {
        assert!(ErrorDistribution::fit(&[], 30).is_none());
        assert!(ErrorDistribution::fit(&[1.0, f64::INFINITY], 30).is_none());
    }
}
