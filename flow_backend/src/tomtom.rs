//! Thin async client for the TomTom traffic and routing endpoints.
//!
//! Responses come back as raw `serde_json::Value`; callers read the nested
//! fields they need and treat anything missing as "unavailable".

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.tomtom.com";

const FLOW_SEGMENT_PATH: &str = "/traffic/services/4/flowSegmentData/absolute/10/json";
const INCIDENT_DETAILS_PATH: &str = "/traffic/services/5/incidentDetails";

#[derive(Debug, Error)]
pub enum TomTomError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl fmt::Display for BoundingBox {
    /// TomTom expects `minLon,minLat,maxLon,maxLat`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Query knobs for `calculateRoute`. `Default` asks for a plain route with
/// no extra parameters.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub traffic: bool,
    pub max_alternatives: Option<u8>,
    pub compute_travel_time_for_all: bool,
    pub route_type: Option<String>,
    pub travel_mode: Option<String>,
}

impl RouteOptions {
    /// Traffic-aware fastest route, used to weight graph edges.
    pub fn live_fastest() -> Self {
        Self {
            traffic: true,
            compute_travel_time_for_all: true,
            route_type: Some("fastest".into()),
            ..Self::default()
        }
    }

    /// Traffic-aware car route plus up to `n` alternatives.
    pub fn with_alternatives(n: u8) -> Self {
        Self {
            traffic: true,
            max_alternatives: Some(n),
            travel_mode: Some("car".into()),
            ..Self::default()
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        if self.traffic {
            q.push(("traffic", "true".to_string()));
        }
        if let Some(n) = self.max_alternatives {
            q.push(("maxAlternatives", n.to_string()));
        }
        if self.compute_travel_time_for_all {
            q.push(("computeTravelTimeFor", "all".to_string()));
        }
        if let Some(rt) = &self.route_type {
            q.push(("routeType", rt.clone()));
        }
        if let Some(mode) = &self.travel_mode {
            q.push(("travelMode", mode.clone()));
        }
        q
    }
}

/// One route returned by `calculateRoute`, reduced to what the selector uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub travel_time_s: i64,
    pub traffic_delay_s: i64,
    pub length_m: i64,
    pub points: Vec<Coordinate>,
}

impl RouteCandidate {
    /// Reads `summary` and the first leg's points. Routes without a summary
    /// travel time are dropped.
    pub fn from_route(route: &Value) -> Option<Self> {
        let summary = route.get("summary")?;
        let travel_time_s = summary.get("travelTimeInSeconds")?.as_i64()?;
        let traffic_delay_s = summary
            .get("trafficDelayInSeconds")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let length_m = summary
            .get("lengthInMeters")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let points = route
            .pointer("/legs/0/points")
            .and_then(Value::as_array)
            .map(|pts| {
                pts.iter()
                    .filter_map(|p| {
                        Some(Coordinate::new(
                            p.get("latitude")?.as_f64()?,
                            p.get("longitude")?.as_f64()?,
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            travel_time_s,
            traffic_delay_s,
            length_m,
            points,
        })
    }
}

pub struct TomTomClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TomTomClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, TomTomError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Live flow for the road segment nearest to `point`.
    pub async fn flow_segment(&self, point: Coordinate) -> Result<Value, TomTomError> {
        self.get_json(FLOW_SEGMENT_PATH, vec![("point", point.to_string())])
            .await
    }

    pub async fn calculate_route(
        &self,
        from: Coordinate,
        to: Coordinate,
        options: &RouteOptions,
    ) -> Result<Value, TomTomError> {
        let path = format!("/routing/1/calculateRoute/{}:{}/json", from, to);
        self.get_json(&path, options.query()).await
    }

    pub async fn incident_details(&self, bbox: BoundingBox) -> Result<Value, TomTomError> {
        self.get_json(
            INCIDENT_DETAILS_PATH,
            vec![
                ("bbox", bbox.to_string()),
                ("language", "en-US".to_string()),
            ],
        )
        .await
    }

    /// Live delay of the fastest route between two points, in whole minutes.
    /// `Ok(None)` when the response has no routes.
    pub async fn route_delay_minutes(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<Option<i64>, TomTomError> {
        let body = self
            .calculate_route(from, to, &RouteOptions::live_fastest())
            .await?;
        Ok(first_route_delay_minutes(&body))
    }

    /// Every route in a `calculateRoute` response with alternatives.
    pub async fn route_candidates(
        &self,
        from: Coordinate,
        to: Coordinate,
        max_alternatives: u8,
    ) -> Result<Vec<RouteCandidate>, TomTomError> {
        let body = self
            .calculate_route(from, to, &RouteOptions::with_alternatives(max_alternatives))
            .await?;
        Ok(routes(&body)
            .iter()
            .filter_map(RouteCandidate::from_route)
            .collect())
    }

    async fn get_json(
        &self,
        path: &str,
        mut query: Vec<(&'static str, String)>,
    ) -> Result<Value, TomTomError> {
        let url = format!("{}{}", self.base_url, path);
        query.push(("key", self.api_key.clone()));

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                // the URL carries the API key
                let e = e.without_url();
                tracing::warn!("GET {} failed: {}", path, e);
                e
            })?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!("GET {} -> {}", path, status);
            return Err(TomTomError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.json::<Value>().await.map_err(|e| {
            let e = e.without_url();
            tracing::warn!("GET {} returned an unreadable body: {}", path, e);
            e
        })?;
        tracing::debug!("GET {} ok", path);
        Ok(body)
    }
}

/// `routes` array of a routing response, empty when absent.
pub fn routes(body: &Value) -> &[Value] {
    body.get("routes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn first_route_delay_minutes(body: &Value) -> Option<i64> {
    let first = routes(body).first()?;
    let delay_s = first
        .pointer("/summary/trafficDelayInSeconds")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    Some(delay_s.div_euclid(60))
}
