use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Holiday label the dataset uses for ordinary days.
pub const NO_HOLIDAY: &str = "None";

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Upper limit on histogram resolution.
pub const MAX_BINS: usize = 1000;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to open dataset {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed dataset row: {0}")]
    Row(#[from] csv::Error),
    #[error("unparseable date_time '{0}'")]
    DateTime(String),
    #[error("histogram needs at least one bin")]
    NoBins,
    #[error("histogram supports at most {max} bins, got {got}")]
    TooManyBins { got: usize, max: usize },
}

/// One hourly row of `Metro_Interstate_Traffic_Volume.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub holiday: String,
    /// Kelvin, as recorded upstream.
    pub temp: f64,
    pub rain_1h: f64,
    pub snow_1h: f64,
    pub clouds_all: u32,
    pub weather_main: String,
    pub weather_description: String,
    #[serde(with = "date_time_format")]
    pub date_time: NaiveDateTime,
    pub traffic_volume: u32,
}

mod date_time_format {
    use super::{parse_date_time, DATE_TIME_FORMAT};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(DATE_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse_date_time(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyMean {
    pub hour: u32,
    pub mean_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub key: String,
    pub mean_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolidayShare {
    pub holiday: String,
    pub total_volume: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherYearMean {
    pub weather: String,
    pub year: i32,
    pub mean_volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMean {
    pub date: NaiveDate,
    pub mean_volume: f64,
}

/// Running sum/count used by every group-by below.
#[derive(Default, Clone, Copy)]
struct Acc {
    sum: f64,
    n: usize,
}

impl Acc {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.n += 1;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }
}

/// The historical dataset, read once and aggregated on demand.
#[derive(Debug, Clone, Default)]
pub struct TrafficHistory {
    records: Vec<HistoryRecord>,
}

impl TrafficHistory {
    pub fn new(records: Vec<HistoryRecord>) -> Self {
        Self { records }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| HistoryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let history = Self::from_reader(file)?;
        tracing::info!(
            "loaded {} history rows from {}",
            history.len(),
            path.display()
        );
        Ok(history)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, HistoryError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        for row in rdr.deserialize() {
            let record: HistoryRecord = row?;
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Equal-width histogram of `traffic_volume`. The top edge is inclusive so
    /// the maximum lands in the last bin. At most [`MAX_BINS`] bins.
    pub fn volume_histogram(&self, bins: usize) -> Result<Vec<HistogramBin>, HistoryError> {
        if bins == 0 {
            return Err(HistoryError::NoBins);
        }
        if bins > MAX_BINS {
            return Err(HistoryError::TooManyBins {
                got: bins,
                max: MAX_BINS,
            });
        }
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        let (lo, hi) = self
            .records
            .iter()
            .map(|r| r.traffic_volume as f64)
            .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let width = (hi - lo) / bins as f64;

        let mut out: Vec<HistogramBin> = (0..bins)
            .map(|i| HistogramBin {
                lower: lo + width * i as f64,
                upper: lo + width * (i + 1) as f64,
                count: 0,
            })
            .collect();

        for r in &self.records {
            let v = r.traffic_volume as f64;
            let idx = if width == 0.0 {
                0
            } else {
                (((v - lo) / width) as usize).min(bins - 1)
            };
            out[idx].count += 1;
        }
        Ok(out)
    }

    pub fn mean_by_hour(&self) -> Vec<HourlyMean> {
        let mut groups: BTreeMap<u32, Acc> = BTreeMap::new();
        for r in &self.records {
            groups
                .entry(r.date_time.hour())
                .or_default()
                .push(r.traffic_volume as f64);
        }
        groups
            .into_iter()
            .map(|(hour, acc)| HourlyMean {
                hour,
                mean_volume: acc.mean(),
            })
            .collect()
    }

    pub fn mean_by_holiday(&self) -> Vec<GroupMean> {
        self.group_mean(|r| r.holiday.clone())
    }

    /// Mean volume per `weather_main`, busiest first.
    pub fn mean_by_weather(&self) -> Vec<GroupMean> {
        let mut out = self.group_mean(|r| r.weather_main.clone());
        out.sort_by(|a, b| b.mean_volume.total_cmp(&a.mean_volume));
        out
    }

    pub fn mean_by_weather_year(&self) -> Vec<WeatherYearMean> {
        let mut groups: BTreeMap<(String, i32), Acc> = BTreeMap::new();
        for r in &self.records {
            groups
                .entry((r.weather_main.clone(), r.date_time.year()))
                .or_default()
                .push(r.traffic_volume as f64);
        }
        groups
            .into_iter()
            .map(|((weather, year), acc)| WeatherYearMean {
                weather,
                year,
                mean_volume: acc.mean(),
            })
            .collect()
    }

    /// Share of total volume per named holiday; ordinary days are excluded.
    pub fn holiday_share(&self) -> Vec<HolidayShare> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for r in self.records.iter().filter(|r| r.holiday != NO_HOLIDAY) {
            *totals.entry(r.holiday.clone()).or_default() += r.traffic_volume as u64;
        }
        let grand: u64 = totals.values().sum();
        totals
            .into_iter()
            .map(|(holiday, total_volume)| HolidayShare {
                percentage: if grand == 0 {
                    0.0
                } else {
                    total_volume as f64 / grand as f64 * 100.0
                },
                holiday,
                total_volume,
            })
            .collect()
    }

    pub fn daily_mean_for_holiday(&self, holiday: &str) -> Vec<DailyMean> {
        let mut groups: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
        for r in self.records.iter().filter(|r| r.holiday == holiday) {
            groups
                .entry(r.date_time.date())
                .or_default()
                .push(r.traffic_volume as f64);
        }
        groups
            .into_iter()
            .map(|(date, acc)| DailyMean {
                date,
                mean_volume: acc.mean(),
            })
            .collect()
    }

    fn group_mean<F>(&self, key: F) -> Vec<GroupMean>
    where
        F: Fn(&HistoryRecord) -> String,
    {
        let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
        for r in &self.records {
            groups.entry(key(r)).or_default().push(r.traffic_volume as f64);
        }
        groups
            .into_iter()
            .map(|(key, acc)| GroupMean {
                key,
                mean_volume: acc.mean(),
            })
            .collect()
    }
}

/// Parse a `date_time` cell outside of CSV deserialization.
pub fn parse_date_time(raw: &str) -> Result<NaiveDateTime, HistoryError> {
    NaiveDateTime::parse_from_str(raw.trim(), DATE_TIME_FORMAT)
        .map_err(|_| HistoryError::DateTime(raw.to_string()))
}
