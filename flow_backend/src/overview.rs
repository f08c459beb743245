use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::FeedConfig;
use crate::tomtom::{routes, RouteOptions, TomTomClient};

pub const FLOW_UNAVAILABLE: &str = "Traffic data unavailable";
pub const TRAVEL_TIME_UNAVAILABLE: &str = "Travel time data unavailable";
pub const NO_ACTIVE_ALERTS: &str = "No active alerts";

/// Metrics of the flow segment, copied through from the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub current_speed_kph: Option<f64>,
    pub free_flow_speed_kph: Option<f64>,
    /// current travel time minus free-flow travel time, seconds
    pub delay_s: Option<i64>,
    pub road_closed: bool,
    pub confidence: Option<f64>,
    pub density: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowOverview {
    Available(FlowMetrics),
    Unavailable { notice: String },
}

impl FlowOverview {
    pub fn from_response(body: &Value) -> Self {
        let Some(seg) = body.get("flowSegmentData") else {
            return Self::unavailable();
        };
        let num = |key: &str| seg.get(key).and_then(Value::as_f64);
        let int = |key: &str| seg.get(key).and_then(Value::as_i64);

        let delay_s = match (int("currentTravelTime"), int("freeFlowTravelTime")) {
            (Some(cur), Some(free)) => Some(cur - free),
            _ => None,
        };

        Self::Available(FlowMetrics {
            current_speed_kph: num("currentSpeed"),
            free_flow_speed_kph: num("freeFlowSpeed"),
            delay_s,
            road_closed: seg
                .get("roadClosure")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            confidence: num("confidence"),
            density: num("trafficDensity"),
        })
    }

    pub fn unavailable() -> Self {
        Self::Unavailable {
            notice: FLOW_UNAVAILABLE.to_string(),
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelTimeSummary {
    pub travel_minutes: f64,
    pub delay_minutes: f64,
    pub free_flow_minutes: f64,
    pub alternative_minutes: Option<f64>,
}

impl TravelTimeSummary {
    /// Reads the first route's summary; a second route, when present, is
    /// reported as the alternative.
    pub fn from_response(body: &Value) -> Option<Self> {
        let all = routes(body);
        let summary = all.first()?.get("summary")?;
        let secs = |v: &Value, key: &str| v.get(key).and_then(Value::as_f64).unwrap_or(0.0);

        let travel = secs(summary, "travelTimeInSeconds") / 60.0;
        let delay = secs(summary, "trafficDelayInSeconds") / 60.0;
        let alternative_minutes = all
            .get(1)
            .and_then(|r| r.pointer("/summary/travelTimeInSeconds"))
            .and_then(Value::as_f64)
            .map(|s| round2(s / 60.0));

        Some(Self {
            travel_minutes: round2(travel),
            delay_minutes: round2(delay),
            free_flow_minutes: round2(travel - delay),
            alternative_minutes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TravelTime {
    Available(TravelTimeSummary),
    Unavailable { notice: String },
}

impl TravelTime {
    pub fn from_response(body: &Value) -> Self {
        match TravelTimeSummary::from_response(body) {
            Some(s) => Self::Available(s),
            None => Self::Unavailable {
                notice: TRAVEL_TIME_UNAVAILABLE.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: String,
    pub description: String,
    pub lat: f64,
    pub lon: f64,
}

impl Alert {
    fn from_incident(v: &Value) -> Option<Self> {
        let kind = match v.get("type")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some(Self {
            kind,
            description: v.get("description")?.as_str()?.to_string(),
            lat: v.pointer("/location/point/latitude")?.as_f64()?,
            lon: v.pointer("/location/point/longitude")?.as_f64()?,
        })
    }

    pub fn message(&self) -> String {
        format!(
            "{}: {} at {}, {}",
            self.kind, self.description, self.lat, self.lon
        )
    }
}

/// Incidents with every field present; malformed entries are skipped.
pub fn alerts_from_response(body: &Value) -> Vec<Alert> {
    body.get("incidents")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Alert::from_incident).collect())
        .unwrap_or_default()
}

/// Everything the live dashboard shows for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    /// e.g. "Tuesday, March 04, 2025"
    pub date_label: String,
    pub flow: FlowOverview,
    pub travel_time: TravelTime,
    pub alerts: Vec<Alert>,
    pub alerts_notice: Option<String>,
}

impl DashboardSnapshot {
    pub fn from_responses(flow: &Value, route: &Value, incidents: &Value) -> Self {
        let now = Utc::now();
        let alerts = alerts_from_response(incidents);
        let alerts_notice = alerts.is_empty().then(|| NO_ACTIVE_ALERTS.to_string());
        Self {
            generated_at: now,
            date_label: now.with_timezone(&Local).format("%A, %B %d, %Y").to_string(),
            flow: FlowOverview::from_response(flow),
            travel_time: TravelTime::from_response(route),
            alerts,
            alerts_notice,
        }
    }
}

/// Fetches the three live views concurrently. A failed call degrades to its
/// "unavailable" rendering instead of failing the snapshot.
pub async fn fetch_snapshot(client: &TomTomClient, cfg: &FeedConfig) -> DashboardSnapshot {
    let opts = RouteOptions::default();
    let (flow, route, incidents) = tokio::join!(
        client.flow_segment(cfg.probe),
        client.calculate_route(cfg.route_from, cfg.route_to, &opts),
        client.incident_details(cfg.incident_bbox),
    );

    let or_null = |name: &str, r: Result<Value, _>| match r {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("{} request failed: {}", name, e);
            Value::Null
        }
    };
    let flow = or_null("flow segment", flow);
    let route = or_null("travel time", route);
    let incidents = or_null("incidents", incidents);

    DashboardSnapshot::from_responses(&flow, &route, &incidents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flow_metrics_pass_through() {
        let body = json!({
            "flowSegmentData": {
                "currentSpeed": 40,
                "freeFlowSpeed": 60,
                "currentTravelTime": 300,
                "freeFlowTravelTime": 200,
                "confidence": 0.95,
                "roadClosure": false
            }
        });
        match FlowOverview::from_response(&body) {
            FlowOverview::Available(m) => {
                assert_eq!(m.current_speed_kph, Some(40.0));
                assert_eq!(m.free_flow_speed_kph, Some(60.0));
                assert_eq!(m.delay_s, Some(100));
                assert!(!m.road_closed);
                assert_eq!(m.confidence, Some(0.95));
                assert_eq!(m.density, None);
            }
            other => panic!("expected metrics, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_flow_segment_is_unavailable() {
        for body in [json!({}), Value::Null, json!({ "error": "quota" })] {
            assert_eq!(
                FlowOverview::from_response(&body),
                FlowOverview::Unavailable {
                    notice: FLOW_UNAVAILABLE.to_string()
                }
            );
        }
    }

    #[test]
    fn test_travel_time_summary() {
        let body = json!({ "routes": [
            { "summary": { "travelTimeInSeconds": 1200, "trafficDelayInSeconds": 180 } },
            { "summary": { "travelTimeInSeconds": 1330 } }
        ]});
        let s = TravelTimeSummary::from_response(&body).unwrap();
        assert_eq!(s.travel_minutes, 20.0);
        assert_eq!(s.delay_minutes, 3.0);
        assert_eq!(s.free_flow_minutes, 17.0);
        assert_eq!(s.alternative_minutes, Some(22.17));

        assert!(matches!(
            TravelTime::from_response(&json!({ "routes": [] })),
            TravelTime::Unavailable { .. }
        ));
    }

    #[test]
    fn test_alerts_skip_malformed_entries() {
        let body = json!({ "incidents": [
            { "type": "Accident", "description": "Lane blocked",
              "location": { "point": { "latitude": 44.95, "longitude": -93.1 } } },
            { "type": 6, "description": "Jam",
              "location": { "point": { "latitude": 44.96, "longitude": -93.2 } } },
            { "type": "Roadworks", "description": "no location" }
        ]});
        let alerts = alerts_from_response(&body);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].message(), "Accident: Lane blocked at 44.95, -93.1");
        assert_eq!(alerts[1].kind, "6");

        let snap = DashboardSnapshot::from_responses(&Value::Null, &Value::Null, &json!({}));
        assert_eq!(snap.alerts_notice.as_deref(), Some(NO_ACTIVE_ALERTS));
    }
}
