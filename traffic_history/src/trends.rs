use serde::{Deserialize, Serialize};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const DAILY_VOLUME: [u32; 7] = [70, 75, 80, 85, 90, 60, 50];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyTrend {
    pub hour: u32,
    pub traffic_volume: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub day: String,
    pub traffic_volume: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficTrends {
    pub hourly: Vec<HourlyTrend>,
    pub daily: Vec<DailyTrend>,
}

/// Fixed hourly/daily shape shown beside the live feed. These are index
/// values, not vehicle counts.
pub fn static_trends() -> TrafficTrends {
    let hourly = (0..24u32)
        .map(|hour| HourlyTrend {
            hour,
            traffic_volume: 50u32.abs_diff(hour) + 20,
        })
        .collect();
    let daily = WEEKDAYS
        .iter()
        .zip(DAILY_VOLUME)
        .map(|(day, traffic_volume)| DailyTrend {
            day: day.to_string(),
            traffic_volume,
        })
        .collect();
    TrafficTrends { hourly, daily }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_trend_shape() {
        let t = static_trends();
        assert_eq!(t.hourly.len(), 24);
        assert_eq!(t.hourly[0].traffic_volume, 70);
        assert_eq!(t.hourly[23].traffic_volume, 47);
        assert_eq!(t.daily.len(), 7);
        assert_eq!(t.daily[4].day, "Fri");
        assert_eq!(t.daily[4].traffic_volume, 90);
    }
}
