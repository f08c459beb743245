//! Historical I-94 traffic records and the descriptive aggregates the
//! dashboards chart from them.

mod history;
mod trends;

pub use history::{
    parse_date_time, DailyMean, GroupMean, HistogramBin, HistoryError, HistoryRecord,
    HolidayShare, HourlyMean, TrafficHistory, WeatherYearMean, MAX_BINS, NO_HOLIDAY,
};
pub use trends::{static_trends, DailyTrend, HourlyTrend, TrafficTrends};
