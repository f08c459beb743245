use crate::error::PredictorError;
use crate::features::{FeatureRow, FeatureWindow, FEATURE_COUNT};

const BUILTIN_MIN: FeatureRow = [
    -1.0, -1.0, -1.0, -1.0, -30.0, 0.0, 0.0, 0.0, 0.0, 0.0, // cyclic, weather, flags
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, // one-hot
    0.0, 1.0, 2012.0, 0.0, 1.0, 1000.0,
];

const BUILTIN_MAX: FeatureRow = [
    1.0, 1.0, 1.0, 1.0, 50.0, 100.0, 50.0, 50.0, 1.0, 1.0, //
    1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, //
    6.0, 12.0, 2025.0, 23.0, 31.0, 2000.0,
];

/// Fixed per-feature min/max used for min-max scaling. Values outside the
/// bounds scale outside [0, 1]; nothing is clipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBounds {
    min: FeatureRow,
    max: FeatureRow,
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self {
            min: BUILTIN_MIN,
            max: BUILTIN_MAX,
        }
    }
}

impl ScaleBounds {
    pub fn new(min: FeatureRow, max: FeatureRow) -> Result<Self, PredictorError> {
        if let Some(i) = (0..FEATURE_COUNT).find(|&i| !(min[i] <= max[i])) {
            return Err(PredictorError::Bounds(format!(
                "feature {} has min {} > max {}",
                i, min[i], max[i]
            )));
        }
        Ok(Self { min, max })
    }

    pub fn from_slices(min: &[f32], max: &[f32]) -> Result<Self, PredictorError> {
        let to_row = |v: &[f32], which: &str| -> Result<FeatureRow, PredictorError> {
            v.try_into().map_err(|_| {
                PredictorError::Bounds(format!(
                    "{} has {} entries, expected {}",
                    which,
                    v.len(),
                    FEATURE_COUNT
                ))
            })
        };
        Self::new(to_row(min, "feature_min")?, to_row(max, "feature_max")?)
    }

    pub fn min(&self) -> &FeatureRow {
        &self.min
    }

    pub fn max(&self) -> &FeatureRow {
        &self.max
    }

    pub fn contains(&self, row: &FeatureRow) -> bool {
        row.iter()
            .enumerate()
            .all(|(i, v)| (self.min[i]..=self.max[i]).contains(v))
    }

    /// `(x - min) / (max - min)`; a zero-width feature divides by 1.
    pub fn scale_row(&self, row: &FeatureRow) -> FeatureRow {
        std::array::from_fn(|i| {
            let range = self.max[i] - self.min[i];
            let range = if range == 0.0 { 1.0 } else { range };
            (row[i] - self.min[i]) / range
        })
    }

    pub fn scale_window(&self, window: &FeatureWindow) -> FeatureWindow {
        FeatureWindow::new(window.rows().map(|r| self.scale_row(&r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_scale_to_unit_corners() {
        let b = ScaleBounds::default();
        assert!(b.scale_row(b.min()).iter().all(|v| *v == 0.0));
        assert!(b.scale_row(b.max()).iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_out_of_bounds_is_not_clipped() {
        let b = ScaleBounds::default();
        let mut row = *b.max();
        row[4] = 90.0; // 40 above the temperature ceiling
        assert!(!b.contains(&row));
        assert!((b.scale_row(&row)[4] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_width_feature() {
        let mut max = BUILTIN_MAX;
        max[0] = -1.0;
        let b = ScaleBounds::new(BUILTIN_MIN, max).unwrap();
        let mut row = BUILTIN_MIN;
        row[0] = 0.5;
        assert_eq!(b.scale_row(&row)[0], 1.5);
    }

    #[test]
    fn test_rejects_inverted_or_short_bounds() {
        assert!(ScaleBounds::new(BUILTIN_MAX, BUILTIN_MIN).is_err());
        assert!(ScaleBounds::from_slices(&[0.0; 26], &[1.0; 26]).is_err());
        assert!(ScaleBounds::from_slices(&BUILTIN_MIN, &BUILTIN_MAX).is_ok());
    }
}
