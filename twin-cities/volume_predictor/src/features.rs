//! Turns one set of calendar/weather inputs into the six-hour window the
//! sequence model consumes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::error::PredictorError;

pub const FEATURE_COUNT: usize = 27;
pub const WINDOW_LEN: usize = 6;

/// Authoritative input order of one row.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "day_sin",
    "day_cos",
    "year_sin",
    "year_cos",
    "temp",
    "clouds_all",
    "rain_1h",
    "snow_1h",
    "is_weekend",
    "is_holiday",
    "weather_Clear",
    "weather_Clouds",
    "weather_Drizzle",
    "weather_Fog",
    "weather_Haze",
    "weather_Mist",
    "weather_Rain",
    "weather_Smoke",
    "weather_Snow",
    "weather_Squall",
    "weather_Thunderstorm",
    "day_of_week",
    "month",
    "year",
    "hour",
    "day",
    "traffic_volume",
];

/// First year of the training data; the year encoding cycles every 13 years.
pub const BASE_YEAR: u16 = 2012;
const YEAR_PERIOD: f64 = 13.0;
const DAY_PERIOD: f64 = 31.0;

/// Range of the last column. It carries no signal at inference time.
pub const FILLER_MIN: u32 = 1000;
pub const FILLER_MAX: u32 = 2000;

pub type FeatureRow = [f32; FEATURE_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Monday = 0.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Weekday::Saturday | Weekday::Sunday)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherCondition {
    Clear,
    Clouds,
    Drizzle,
    Fog,
    Haze,
    Mist,
    Rain,
    Smoke,
    Snow,
    Squall,
    Thunderstorm,
}

impl WeatherCondition {
    pub const COUNT: usize = 11;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn one_hot(self) -> [f32; Self::COUNT] {
        let mut v = [0.0; Self::COUNT];
        v[self.index()] = 1.0;
        v
    }
}

/// What a user picks for one prediction. Missing JSON fields take the
/// same defaults as the input form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConditions {
    pub day: u8,
    pub month: u8,
    pub year: u16,
    pub day_of_week: Weekday,
    pub hour: u8,
    pub temperature_c: f32,
    pub clouds_pct: u8,
    pub rain_mm: f32,
    pub snow_mm: f32,
    pub is_holiday: bool,
    pub weather: WeatherCondition,
}

impl Default for TrafficConditions {
    fn default() -> Self {
        Self {
            day: 15,
            month: 6,
            year: 2023,
            day_of_week: Weekday::Monday,
            hour: 12,
            temperature_c: 20.0,
            clouds_pct: 50,
            rain_mm: 0.0,
            snow_mm: 0.0,
            is_holiday: false,
            weather: WeatherCondition::Clear,
        }
    }
}

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), PredictorError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PredictorError::InvalidInput {
            field,
            value,
            min,
            max,
        })
    }
}

impl TrafficConditions {
    /// Range checks only; impossible dates such as Feb 31 pass.
    pub fn validate(&self) -> Result<(), PredictorError> {
        check("day", self.day as f64, 1.0, 31.0)?;
        check("month", self.month as f64, 1.0, 12.0)?;
        check("year", self.year as f64, BASE_YEAR as f64, 2025.0)?;
        check("hour", self.hour as f64, 0.0, 23.0)?;
        check("temperature_c", self.temperature_c as f64, -30.0, 50.0)?;
        check("clouds_pct", self.clouds_pct as f64, 0.0, 100.0)?;
        check("rain_mm", self.rain_mm as f64, 0.0, 50.0)?;
        check("snow_mm", self.snow_mm as f64, 0.0, 50.0)?;
        Ok(())
    }

    pub fn is_weekend(&self) -> bool {
        self.day_of_week.is_weekend()
    }
}

/// The selected hour and the five before it, floored at midnight.
pub fn past_hours(hour: u8) -> [u8; WINDOW_LEN] {
    std::array::from_fn(|offset| hour.saturating_sub(offset as u8))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    rows: [FeatureRow; WINDOW_LEN],
}

impl FeatureWindow {
    pub fn new(rows: [FeatureRow; WINDOW_LEN]) -> Self {
        Self { rows }
    }

    pub fn zeros() -> Self {
        Self {
            rows: [[0.0; FEATURE_COUNT]; WINDOW_LEN],
        }
    }

    pub fn rows(&self) -> &[FeatureRow; WINDOW_LEN] {
        &self.rows
    }

    /// Row-major, `WINDOW_LEN * FEATURE_COUNT` values.
    pub fn to_flat(&self) -> Vec<f32> {
        self.rows.iter().flatten().copied().collect()
    }

    pub fn to_nested(&self) -> Vec<Vec<f32>> {
        self.rows.iter().map(|r| r.to_vec()).collect()
    }

    pub fn summary(&self) -> FeatureSummary {
        let flat = self.to_flat();
        let n = flat.len() as f32;
        let nonzero = flat.iter().filter(|x| **x != 0.0).count();
        let mean = flat.iter().sum::<f32>() / n;
        let std = (flat.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n).sqrt();
        let sample = FEATURE_NAMES
            .iter()
            .zip(self.rows[0].iter())
            .take(6)
            .map(|(name, v)| (*name, *v))
            .collect();
        FeatureSummary {
            len: flat.len(),
            nonzero,
            mean,
            std,
            sample,
        }
    }
}

/// Debug view of a window, logged when `LOG_FEATURES=1`.
#[derive(Debug, Clone)]
pub struct FeatureSummary {
    pub len: usize,
    pub nonzero: usize,
    pub mean: f32,
    pub std: f32,
    pub sample: Vec<(&'static str, f32)>,
}

impl fmt::Display for FeatureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sample: Vec<String> = self
            .sample
            .iter()
            .map(|(name, v)| format!("{}={:.3}", name, v))
            .collect();
        write!(
            f,
            "in_dim={} nonzero={} mean={:.3} std={:.3} sample=[{}]",
            self.len,
            self.nonzero,
            self.mean,
            self.std,
            sample.join(", ")
        )
    }
}

/// Builds the unscaled window. Every row shares the calendar and weather
/// context; only the hour and the filler column differ.
pub fn assemble<R: Rng + ?Sized>(c: &TrafficConditions, rng: &mut R) -> FeatureWindow {
    let day = c.day as f64;
    let year_offset = (c.year as f64) - BASE_YEAR as f64;
    let day_angle = 2.0 * PI * day / DAY_PERIOD;
    let year_angle = 2.0 * PI * year_offset / YEAR_PERIOD;
    let weather = c.weather.one_hot();

    let rows = past_hours(c.hour).map(|hour| {
        let mut row = [0.0f32; FEATURE_COUNT];
        row[0] = day_angle.sin() as f32;
        row[1] = day_angle.cos() as f32;
        row[2] = year_angle.sin() as f32;
        row[3] = year_angle.cos() as f32;
        row[4] = c.temperature_c;
        row[5] = c.clouds_pct as f32;
        row[6] = c.rain_mm;
        row[7] = c.snow_mm;
        row[8] = if c.is_weekend() { 1.0 } else { 0.0 };
        row[9] = if c.is_holiday { 1.0 } else { 0.0 };
        row[10..21].copy_from_slice(&weather);
        row[21] = c.day_of_week.ordinal() as f32;
        row[22] = c.month as f32;
        row[23] = c.year as f32;
        row[24] = hour as f32;
        row[25] = c.day as f32;
        row[26] = rng.gen_range(FILLER_MIN..=FILLER_MAX) as f32;
        row
    });
    FeatureWindow { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_past_hours_floor_at_midnight() {
        assert_eq!(past_hours(12), [12, 11, 10, 9, 8, 7]);
        assert_eq!(past_hours(3), [3, 2, 1, 0, 0, 0]);
        assert_eq!(past_hours(0), [0; 6]);
    }

    #[test]
    fn test_row_layout() {
        let c = TrafficConditions {
            day: 31,
            month: 12,
            year: 2012,
            day_of_week: Weekday::Saturday,
            hour: 2,
            temperature_c: -5.5,
            clouds_pct: 90,
            rain_mm: 0.0,
            snow_mm: 3.0,
            is_holiday: true,
            weather: WeatherCondition::Snow,
        };
        let w = assemble(&c, &mut StdRng::seed_from_u64(7));
        let r = &w.rows()[0];

        // day 31 is a full turn of the 31-day cycle
        assert!(r[0].abs() < 1e-5);
        assert!((r[1] - 1.0).abs() < 1e-6);
        assert_eq!(r[2], 0.0);
        assert_eq!(r[3], 1.0);
        assert_eq!(r[4], -5.5);
        assert_eq!(r[5], 90.0);
        assert_eq!(r[7], 3.0);
        assert_eq!(r[8], 1.0);
        assert_eq!(r[9], 1.0);
        assert_eq!(r[10 + WeatherCondition::Snow.index()], 1.0);
        assert_eq!(r[10..21].iter().sum::<f32>(), 1.0);
        assert_eq!(r[21], 5.0);
        assert_eq!(r[22], 12.0);
        assert_eq!(r[23], 2012.0);
        assert_eq!(r[25], 31.0);

        let hours: Vec<f32> = w.rows().iter().map(|r| r[24]).collect();
        assert_eq!(hours, vec![2.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        for row in w.rows() {
            assert!((FILLER_MIN as f32..=FILLER_MAX as f32).contains(&row[26]));
        }
    }

    #[test]
    fn test_weekday_flags() {
        assert_eq!(Weekday::Monday.ordinal(), 0);
        assert_eq!(Weekday::Sunday.ordinal(), 6);
        assert!(Weekday::Sunday.is_weekend());
        assert!(!Weekday::Friday.is_weekend());
    }

    #[test]
    fn test_validate_reports_first_bad_field() {
        let mut c = TrafficConditions::default();
        assert!(c.validate().is_ok());
        c.hour = 24;
        c.clouds_pct = 150;
        match c.validate() {
            Err(PredictorError::InvalidInput { field, .. }) => assert_eq!(field, "hour"),
            other => panic!("expected invalid hour, got {:?}", other),
        }
        let c = TrafficConditions {
            rain_mm: f32::NAN,
            ..TrafficConditions::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_form_defaults() {
        let c: TrafficConditions =
            serde_json::from_str(r#"{ "hour": 8, "weather": "Rain", "day_of_week": "Sunday" }"#)
                .unwrap();
        assert_eq!(c.hour, 8);
        assert_eq!(c.day, 15);
        assert_eq!(c.weather, WeatherCondition::Rain);
        assert!(c.is_weekend());
    }

    #[test]
    fn test_summary_counts() {
        let s = FeatureWindow::zeros().summary();
        assert_eq!(s.len, WINDOW_LEN * FEATURE_COUNT);
        assert_eq!(s.nonzero, 0);
        assert_eq!(s.sample.len(), 6);
        assert!(s.to_string().starts_with("in_dim=162 nonzero=0"));
    }
}
