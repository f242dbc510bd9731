/// Linear map of a column into `[0, 1]` using its observed extremes.
///
/// A zero range is treated as a unit range, so a constant series maps to 0
/// and inverts back to the constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    min: f64,
    range: f64,
}

impl MinMaxScaler {
    /// Returns `None` when `values` is empty or contains a non-finite value.
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = if max - min > 0.0 { max - min } else { 1.0 };
        Some(Self { min, range })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.min + self.range
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.range + self.min
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn inverse_all(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&v| self.inverse(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_extremes_to_unit_interval() {
        let values = [150.0, 120.0, 180.0, 135.0];
        let scaler = MinMaxScaler::fit(&values).unwrap();

        assert_eq!(scaler.min(), 120.0);
        assert_eq!(scaler.max(), 180.0);
        assert_eq!(scaler.transform(120.0), 0.0);
        assert_eq!(scaler.transform(180.0), 1.0);
        assert!((scaler.transform(150.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn inverse_undoes_transform() {
        let values: Vec<f64> = (0..250).map(|i| 90.0 + (i as f64 * 0.37).sin() * 25.0).collect();
        let scaler = MinMaxScaler::fit(&values).unwrap();

        let restored = scaler.inverse_all(&scaler.transform_all(&values));
        for (a, b) in values.iter().zip(&restored) {
            assert!((a - b).abs() < 1e-9, "{a} != {b}");
        }
    }

    #[test]
    fn constant_series_round_trips() {
        let scaler = MinMaxScaler::fit(&[42.0; 5]).unwrap();
        assert_eq!(scaler.transform(42.0), 0.0);
        assert_eq!(scaler.inverse(0.0), 42.0);
    }

    #[test]
    fn rejects_empty_and_non_finite() {
        assert!(MinMaxScaler::fit(&[]).is_none());
        assert!(MinMaxScaler::fit(&[1.0, f64::NAN]).is_none());
    }
}
